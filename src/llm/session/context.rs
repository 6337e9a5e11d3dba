use llama_cpp::standard_sampler::{SamplerStage, StandardSampler};
use llama_cpp::{LlamaModel, SessionParams};
use tracing::debug;
use crate::config::ModelSettings;
use crate::llm::generator::{collect_completion, GenerateError, SamplingParams};

/// Per-session llama.cpp parameters taken from the model settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    n_ctx: u32,
    n_batch: u32,
    n_threads: Option<u32>,
}

impl From<&ModelSettings> for SessionSettings {
    fn from(settings: &ModelSettings) -> Self {
        Self {
            n_ctx: settings.n_ctx,
            n_batch: settings.n_batch,
            n_threads: settings.n_threads,
        }
    }
}

impl SessionSettings {
    fn params(&self) -> SessionParams {
        let mut params = SessionParams {
            n_ctx: self.n_ctx,
            n_batch: self.n_batch,
            ..Default::default()
        };
        if let Some(n_threads) = self.n_threads {
            params.n_threads = n_threads;
            params.n_threads_batch = n_threads;
        }
        params
    }
}

fn sampler_for(params: &SamplingParams) -> StandardSampler {
    if params.temperature <= 0.0 {
        return StandardSampler::new_greedy();
    }
    // Same order llama.cpp applies by default: nucleus cut, then temperature
    StandardSampler::new_softmax(
        vec![
            SamplerStage::TopP(params.top_p),
            SamplerStage::Temperature(params.temperature),
        ],
        1,
    )
}

/// Runs one completion of `prompt` in a fresh session.
///
/// Returns only the generated text, cut before the first stop sequence.
pub fn complete(
    model: &LlamaModel,
    settings: &SessionSettings,
    prompt: &str,
    params: &SamplingParams,
) -> Result<String, GenerateError> {
    let mut session = model
        .create_session(settings.params())
        .map_err(|e| format!("Failed to create LlamaSession: {}", e))?;

    session
        .advance_context(prompt)
        .map_err(|e| format!("Failed to advance context: {}", e))?;

    let max_tokens = params.max_tokens as usize;
    let completions = session.start_completing_with(sampler_for(params), max_tokens)?;

    // into_strings holds back a code point until all of its bytes have arrived
    let (text, generated, stopped) = collect_completion(completions.into_strings(), params);

    debug!(generated, stopped, "Completion finished");
    Ok(text)
}
