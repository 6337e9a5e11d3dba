use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::config::{GenerationDefaults, OutputField};
use crate::llm::SamplingParams;

/// One inference request as delivered by the serverless runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    /// Runtime-assigned job id; absent for local test input
    #[serde(default)]
    pub id: Option<String>,
    /// Raw input object; parsed by the handler so malformed input becomes an
    /// error result instead of a rejected job
    #[serde(default)]
    pub input: Value,
}

impl Job {
    pub fn new(id: impl Into<String>, input: Value) -> Self {
        Self {
            id: Some(id.into()),
            input,
        }
    }
}

/// Stop sequences may be sent as a single string or a list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopSequences::One(s) => vec![s],
            StopSequences::Many(v) => v,
        }
    }
}

/// The typed view of a job's `input` object. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobInput {
    pub prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop: Option<StopSequences>,
}

impl JobInput {
    /// Parses `input`; a missing or null input is an empty one.
    pub fn from_value(input: &Value) -> Result<Self, serde_json::Error> {
        match input {
            Value::Null => Ok(Self::default()),
            other => JobInput::deserialize(other),
        }
    }

    /// The non-empty prompt, if one was provided
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.is_empty())
    }

    /// Job overrides layered over the configured defaults.
    ///
    /// Overrides are held to the same ranges as the configured defaults.
    pub fn sampling(&self, defaults: &GenerationDefaults) -> Result<SamplingParams, String> {
        let params = SamplingParams {
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            stop: self
                .stop
                .clone()
                .map(StopSequences::into_vec)
                .unwrap_or_else(|| defaults.stop.clone()),
        };

        if params.max_tokens == 0 {
            return Err("max_tokens must be greater than 0".to_string());
        }
        if !params.temperature.is_finite() || params.temperature < 0.0 {
            return Err(format!("temperature must be a non-negative number, got {}", params.temperature));
        }
        if !(params.top_p > 0.0 && params.top_p <= 1.0) {
            return Err(format!("top_p must be in (0, 1], got {}", params.top_p));
        }
        Ok(params)
    }
}

/// Outcome of one job. Failures are values, never panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success(String),
    Error(String),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success(_))
    }

    /// Renders `{"<field>": text}` or `{"error": message}`.
    pub fn to_output(&self, field: OutputField) -> Value {
        let mut map = Map::new();
        match self {
            JobResult::Success(text) => map.insert(field.as_str().to_string(), Value::String(text.clone())),
            JobResult::Error(message) => map.insert("error".to_string(), Value::String(message.clone())),
        };
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> GenerationDefaults {
        GenerationDefaults {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            stop: vec!["</s>".to_string(), "<|im_end|>".to_string()],
        }
    }

    #[test]
    fn test_job_without_input() {
        let job: Job = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(job.id.as_deref(), Some("abc"));
        assert_eq!(JobInput::from_value(&job.input).unwrap(), JobInput::default());
    }

    #[test]
    fn test_empty_prompt_is_no_prompt() {
        let input = JobInput::from_value(&json!({"prompt": ""})).unwrap();
        assert_eq!(input.prompt(), None);
    }

    #[test]
    fn test_defaults_fill_missing_parameters() {
        let input = JobInput::from_value(&json!({"prompt": "Hello", "temperature": 0.1})).unwrap();
        let params = input.sampling(&defaults()).unwrap();
        assert_eq!(params.max_tokens, 512);
        assert!((params.temperature - 0.1).abs() < 1e-6);
        assert!((params.top_p - 0.95).abs() < 1e-6);
        assert_eq!(params.stop, defaults().stop);
    }

    #[test]
    fn test_stop_accepts_single_string() {
        let input = JobInput::from_value(&json!({"prompt": "x", "stop": "\n\n"})).unwrap();
        assert_eq!(input.sampling(&defaults()).unwrap().stop, vec!["\n\n".to_string()]);
    }

    #[test]
    fn test_explicit_empty_stop_list_is_kept() {
        let input = JobInput::from_value(&json!({"prompt": "x", "stop": []})).unwrap();
        assert!(input.sampling(&defaults()).unwrap().stop.is_empty());
    }

    #[test]
    fn test_wrong_types_fail_to_parse() {
        assert!(JobInput::from_value(&json!({"prompt": 5})).is_err());
        assert!(JobInput::from_value(&json!({"prompt": "x", "max_tokens": -3})).is_err());
        assert!(JobInput::from_value(&json!("just a string")).is_err());
    }

    #[test]
    fn test_out_of_range_overrides_rejected() {
        let zero = JobInput::from_value(&json!({"prompt": "x", "max_tokens": 0})).unwrap();
        assert_eq!(zero.sampling(&defaults()).unwrap_err(), "max_tokens must be greater than 0");

        let cold = JobInput::from_value(&json!({"prompt": "x", "temperature": -0.5})).unwrap();
        assert!(cold.sampling(&defaults()).is_err());

        let greedy = JobInput::from_value(&json!({"prompt": "x", "temperature": 0.0})).unwrap();
        assert!(greedy.sampling(&defaults()).is_ok());

        for top_p in [0.0, 1.5] {
            let input = JobInput::from_value(&json!({"prompt": "x", "top_p": top_p})).unwrap();
            assert!(input.sampling(&defaults()).unwrap_err().starts_with("top_p"));
        }
    }

    #[test]
    fn test_output_shapes() {
        let ok = JobResult::Success("world".to_string());
        assert_eq!(ok.to_output(OutputField::Text), json!({"text": "world"}));
        assert_eq!(ok.to_output(OutputField::Response), json!({"response": "world"}));
        let err = JobResult::Error("boom".to_string());
        assert_eq!(err.to_output(OutputField::Text), json!({"error": "boom"}));
    }
}
