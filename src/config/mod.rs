// Required external crates for configuration management and serialization
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use config::{Config, ConfigError, Environment, File};

/// Prefix for structured environment overrides, e.g. `WORKER_MODEL__N_CTX=8192`.
const ENV_PREFIX: &str = "WORKER";

/// Which llama.cpp call shape a job is forwarded to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// Raw text completion: the prompt is passed through untouched
    Completion,
    /// Chat completion: the prompt becomes a user turn in a chat template
    Chat,
}

/// Key under which successful output text is returned to the runtime.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputField {
    Text,
    Response,
}

impl OutputField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputField::Text => "text",
            OutputField::Response => "response",
        }
    }
}

/// What to do when the model cannot be loaded at startup.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoadFailurePolicy {
    /// Exit the process so the platform can restart the worker
    Abort,
    /// Keep serving; every job retries the load and reports an error on failure
    Continue,
}

/// Log output format
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Configuration for loading the model into llama.cpp
#[derive(Debug, Deserialize, Clone)]
pub struct ModelSettings {
    /// Path to the GGUF checkpoint
    #[serde(default)]
    pub path: PathBuf,
    /// Context window size in tokens
    pub n_ctx: u32,
    /// Layers to offload to GPU; -1 offloads every layer
    pub n_gpu_layers: i32,
    /// Tokens processed per llama.cpp decode call (not request batching)
    pub n_batch: u32,
    /// GPU that holds scratch buffers and small tensors
    pub main_gpu: u32,
    /// Per-GPU proportion of the weights; empty lets llama.cpp decide
    #[serde(default)]
    pub tensor_split: Vec<f32>,
    /// CPU threads for generation; library default when unset
    pub n_threads: Option<u32>,
    pub use_mmap: bool,
    pub use_mlock: bool,
    /// Run one throwaway generation after loading
    pub warmup: bool,
    pub api: ApiMode,
    /// System turn prepended in chat mode
    pub system_prompt: Option<String>,
}

/// Sampling values used when a job leaves them out
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationDefaults {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

/// Job-handling behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerSettings {
    pub output_field: OutputField,
    pub on_load_failure: LoadFailurePolicy,
}

/// Configuration for the local HTTP endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Configuration for application logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    pub format: LogFormat,
    /// Directory for a daily-rolling log file; stdout when unset
    pub file: Option<PathBuf>,
}

/// Main settings struct that contains all configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub model: ModelSettings,
    pub generation: GenerationDefaults,
    pub worker: WorkerSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

/// Failure to produce a usable `Settings`.
#[derive(Debug)]
pub enum SettingsError {
    /// A required value was not provided by any source
    Missing { key: &'static str },
    /// A value was provided but could not be parsed or is out of range
    Invalid { key: String, value: String, reason: String },
    /// The layered configuration could not be built or deserialized
    Source(ConfigError),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Missing { key } => write!(f, "Missing required setting: {}", key),
            SettingsError::Invalid { key, value, reason } => {
                write!(f, "Invalid value for {}: {:?} ({})", key, value, reason)
            }
            SettingsError::Source(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SettingsError::Source(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SettingsError {
    fn from(err: ConfigError) -> Self {
        SettingsError::Source(err)
    }
}

impl SettingsError {
    fn invalid(key: &str, value: impl ToString, reason: impl ToString) -> Self {
        SettingsError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Implementation for loading and parsing configuration
impl Settings {
    /// Creates a new Settings instance by loading config from multiple sources
    /// in the following order of precedence (highest to lowest):
    /// 1. Legacy variables (`MODEL_PATH`, `N_CTX`, `N_GPU_LAYERS`, `N_BATCH`,
    ///    `MAIN_GPU`, `GPU_SPLIT`, `N_THREADS`)
    /// 2. Environment variables prefixed with `WORKER_`
    /// 3. Local config file (`config/local.toml`) if present
    /// 4. Default config file (`config/default.toml`) if present
    /// 5. Built-in defaults
    pub fn new() -> Result<Self, SettingsError> {
        let config_dir = std::env::current_dir()
            .map_err(|e| ConfigError::Message(format!("Failed to get current directory: {}", e)))?
            .join("config");
        Self::from_sources(&config_dir, std::env::vars().collect())
    }

    /// Loads settings from `config_dir` and an explicit environment map.
    pub fn from_sources(config_dir: &Path, env: HashMap<String, String>) -> Result<Self, SettingsError> {
        let default_config = config_dir.join("default.toml");
        let local_config = config_dir.join("local.toml");

        let mut settings = Self::builder_with_defaults()?
            .add_source(File::from(default_config).required(false))
            .add_source(File::from(local_config).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("model.tensor_split")
                    .with_list_parse_key("generation.stop")
                    .source(Some(env.clone())),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        settings.apply_legacy_env(&env)?;
        settings.validate()?;

        Ok(settings)
    }

    fn builder_with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("model.n_ctx", 4096)?
            .set_default("model.n_gpu_layers", -1)?
            .set_default("model.n_batch", 512)?
            .set_default("model.main_gpu", 0)?
            .set_default("model.tensor_split", Vec::<f64>::new())?
            .set_default("model.use_mmap", true)?
            .set_default("model.use_mlock", false)?
            .set_default("model.warmup", true)?
            .set_default("model.api", "completion")?
            .set_default("generation.max_tokens", 512)?
            .set_default("generation.temperature", 0.7)?
            .set_default("generation.top_p", 0.95)?
            .set_default("generation.stop", vec!["</s>", "<|im_end|>"])?
            .set_default("worker.output_field", "text")?
            .set_default("worker.on_load_failure", "abort")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")
    }

    /// Applies the flat variable names deployments set on the worker image.
    fn apply_legacy_env(&mut self, env: &HashMap<String, String>) -> Result<(), SettingsError> {
        if let Some(path) = env.get("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(n_ctx) = parse_var(env, "N_CTX")? {
            self.model.n_ctx = n_ctx;
        }
        if let Some(n_gpu_layers) = parse_var(env, "N_GPU_LAYERS")? {
            self.model.n_gpu_layers = n_gpu_layers;
        }
        if let Some(n_batch) = parse_var(env, "N_BATCH")? {
            self.model.n_batch = n_batch;
        }
        if let Some(main_gpu) = parse_var(env, "MAIN_GPU")? {
            self.model.main_gpu = main_gpu;
        }
        if let Some(split) = env.get("GPU_SPLIT") {
            self.model.tensor_split = parse_tensor_split(split)
                .map_err(|reason| SettingsError::invalid("GPU_SPLIT", split, reason))?;
        }
        if let Some(n_threads) = parse_var(env, "N_THREADS")? {
            self.model.n_threads = Some(n_threads);
        }
        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), SettingsError> {
        if self.model.path.as_os_str().is_empty() {
            return Err(SettingsError::Missing { key: "MODEL_PATH" });
        }

        if self.model.n_ctx == 0 {
            return Err(SettingsError::invalid("model.n_ctx", self.model.n_ctx, "must be greater than 0"));
        }

        if self.model.n_batch == 0 {
            return Err(SettingsError::invalid("model.n_batch", self.model.n_batch, "must be greater than 0"));
        }

        if self.model.n_gpu_layers < -1 {
            return Err(SettingsError::invalid(
                "model.n_gpu_layers",
                self.model.n_gpu_layers,
                "must be -1 (all layers) or a non-negative count",
            ));
        }

        if self.model.n_threads == Some(0) {
            return Err(SettingsError::invalid("model.n_threads", 0, "must be greater than 0"));
        }

        validate_tensor_split(&self.model.tensor_split)
            .map_err(|reason| SettingsError::invalid("model.tensor_split", format!("{:?}", self.model.tensor_split), reason))?;

        if self.generation.max_tokens == 0 {
            return Err(SettingsError::invalid("generation.max_tokens", 0, "must be greater than 0"));
        }

        if !self.generation.temperature.is_finite() || self.generation.temperature < 0.0 {
            return Err(SettingsError::invalid(
                "generation.temperature",
                self.generation.temperature,
                "must be a non-negative number",
            ));
        }

        if !(self.generation.top_p > 0.0 && self.generation.top_p <= 1.0) {
            return Err(SettingsError::invalid("generation.top_p", self.generation.top_p, "must be in (0, 1]"));
        }

        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(SettingsError::invalid(
                "logging.level",
                &self.logging.level,
                "must be one of: error, warn, info, debug, trace",
            )),
        }
    }
}

/// Reads `key` from `env` and parses it, naming the variable on failure.
fn parse_var<T>(env: &HashMap<String, String>, key: &'static str) -> Result<Option<T>, SettingsError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SettingsError::invalid(key, raw, e)),
    }
}

/// Parses a comma-separated list of GPU proportions such as `"0.6,0.4"`.
pub fn parse_tensor_split(raw: &str) -> Result<Vec<f32>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let ratios = trimmed
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| format!("{:?} is not a number: {}", part.trim(), e))
        })
        .collect::<Result<Vec<f32>, String>>()?;
    validate_tensor_split(&ratios)?;
    Ok(ratios)
}

fn validate_tensor_split(ratios: &[f32]) -> Result<(), String> {
    if ratios.is_empty() {
        return Ok(());
    }
    if ratios.iter().any(|r| !r.is_finite() || *r < 0.0) {
        return Err("ratios must be finite and non-negative".to_string());
    }
    if ratios.iter().sum::<f32>() <= 0.0 {
        return Err("ratios must not all be zero".to_string());
    }
    Ok(())
}
