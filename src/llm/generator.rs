use std::error::Error;
use crate::config::GenerationDefaults;

/// Error type crossing the generator seam; native library errors are boxed as-is.
pub type GenerateError = Box<dyn Error + Send + Sync>;

/// Sampling controls for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Generation ends before the first occurrence of any of these
    pub stop: Vec<String>,
}

impl From<&GenerationDefaults> for SamplingParams {
    fn from(defaults: &GenerationDefaults) -> Self {
        Self {
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            top_p: defaults.top_p,
            stop: defaults.stop.clone(),
        }
    }
}

/// A loaded model that can complete text.
///
/// Implementations run synchronously and return only the newly generated
/// text, already cut at the first stop sequence.
pub trait TextGenerator: Send {
    fn generate(&mut self, prompt: &str, params: &SamplingParams) -> Result<String, GenerateError>;
}

impl<G: TextGenerator + ?Sized> TextGenerator for Box<G> {
    fn generate(&mut self, prompt: &str, params: &SamplingParams) -> Result<String, GenerateError> {
        (**self).generate(prompt, params)
    }
}

/// Byte offset of the earliest stop sequence in `text`, if any.
///
/// Empty stop strings are ignored.
pub fn find_stop(text: &str, stop: &[String]) -> Option<usize> {
    stop.iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

/// Cuts `text` in place before the earliest stop sequence. Returns whether
/// a stop sequence was found.
pub fn truncate_at_stop(text: &mut String, stop: &[String]) -> bool {
    match find_stop(text, stop) {
        Some(idx) => {
            text.truncate(idx);
            true
        }
        None => false,
    }
}

/// Joins decoded token pieces into the completion text.
///
/// Each piece counts as one generated token. Accumulation ends at the first
/// stop sequence (which is cut off) or after `params.max_tokens` pieces.
/// Returns the text, the number of pieces consumed and whether a stop
/// sequence ended it.
pub fn collect_completion<I, S>(pieces: I, params: &SamplingParams) -> (String, usize, bool)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let max_tokens = params.max_tokens as usize;
    let mut text = String::new();
    let mut generated = 0usize;
    for piece in pieces {
        if generated >= max_tokens {
            break;
        }
        text.push_str(piece.as_ref());
        generated += 1;
        if truncate_at_stop(&mut text, &params.stop) {
            return (text, generated, true);
        }
    }
    (text, generated, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_earliest_stop_wins() {
        let mut text = "answer<|im_end|>more</s>".to_string();
        assert!(truncate_at_stop(&mut text, &stops(&["</s>", "<|im_end|>"])));
        assert_eq!(text, "answer");
    }

    #[test]
    fn test_no_stop_leaves_text() {
        let mut text = "plain output".to_string();
        assert!(!truncate_at_stop(&mut text, &stops(&["</s>"])));
        assert_eq!(text, "plain output");
    }

    #[test]
    fn test_empty_stop_strings_ignored() {
        assert_eq!(find_stop("abc", &stops(&["", "c"])), Some(2));
        assert_eq!(find_stop("abc", &stops(&[""])), None);
    }

    fn params(max_tokens: u32, stop: &[&str]) -> SamplingParams {
        SamplingParams {
            max_tokens,
            temperature: 0.7,
            top_p: 0.95,
            stop: stops(stop),
        }
    }

    #[test]
    fn test_collect_stop_split_across_pieces() {
        let pieces = ["The answer", " is 42<|im", "_end|>", "ignored"];
        let (text, generated, stopped) = collect_completion(pieces, &params(512, &["<|im_end|>"]));
        assert_eq!(text, "The answer is 42");
        assert_eq!(generated, 3);
        assert!(stopped);
    }

    #[test]
    fn test_collect_cut_at_max_tokens() {
        let pieces = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        let (text, generated, stopped) = collect_completion(pieces, &params(2, &[]));
        assert_eq!(text, "ab");
        assert_eq!(generated, 2);
        assert!(!stopped);
    }

    #[test]
    fn test_collect_keeps_multibyte_pieces_intact() {
        // A code point spread over two tokens arrives as an empty piece, then the whole character
        let pieces = ["Hi ", "", "😀", " 日本"];
        let (text, _, _) = collect_completion(pieces, &params(512, &["</s>"]));
        assert_eq!(text, "Hi 😀 日本");
        assert!(!text.contains(char::REPLACEMENT_CHARACTER));
    }
}
