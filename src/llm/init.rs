use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use crate::config::{GenerationDefaults, ModelSettings};
use crate::gguf::{is_gguf_file, GGUFError, GGUFReader};
use crate::llm::generator::{GenerateError, SamplingParams, TextGenerator};
use crate::llm::offload::offloaded_layers;

/// Prompt used for the post-load warm-up generation
const WARMUP_PROMPT: &str = "Test prompt.";

/// Why the model could not be brought up.
#[derive(Debug)]
pub enum InitError {
    /// Nothing exists at the configured path (e.g. the volume is not attached)
    ModelNotFound(PathBuf),
    /// The file exists but is not a readable GGUF checkpoint
    InvalidModel { path: PathBuf, source: GGUFError },
    /// The native library refused to load the model
    Load(GenerateError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::ModelNotFound(path) => write!(
                f,
                "Model file not found at {}. Ensure the volume is attached and the path is accurate.",
                path.display()
            ),
            InitError::InvalidModel { path, source } => {
                write!(f, "Model file at {} is not a valid GGUF checkpoint: {}", path.display(), source)
            }
            InitError::Load(e) => write!(f, "Error loading model: {}", e),
        }
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InitError::ModelNotFound(_) => None,
            InitError::InvalidModel { source, .. } => Some(source),
            InitError::Load(e) => {
                let err: &(dyn Error + 'static) = e.as_ref();
                Some(err)
            }
        }
    }
}

/// Verifies the checkpoint, loads it with `load`, and optionally warms it up.
///
/// `load` is the backend constructor, normally `LlamaGenerator::load`.
pub fn initialize<G, F>(model: &ModelSettings, defaults: &GenerationDefaults, load: F) -> Result<G, InitError>
where
    G: TextGenerator,
    F: FnOnce(&ModelSettings) -> Result<G, GenerateError>,
{
    info!("Initializing model...");
    let start = Instant::now();

    if !model.path.is_file() {
        return Err(InitError::ModelNotFound(model.path.clone()));
    }

    if !is_gguf_file(&model.path) {
        return Err(InitError::InvalidModel {
            path: model.path.clone(),
            source: GGUFError::InvalidFormat("missing GGUF magic number".to_string()),
        });
    }

    let header = GGUFReader::open(&model.path).map_err(|source| InitError::InvalidModel {
        path: model.path.clone(),
        source,
    })?;
    log_checkpoint(&header, model);

    let mut generator = load(model).map_err(InitError::Load)?;
    info!("Model loaded successfully in {:.2} seconds.", start.elapsed().as_secs_f64());

    if model.warmup {
        warm_up(&mut generator, defaults);
    }

    Ok(generator)
}

/// Runs a one-token generation. Failure is logged as a warning only.
pub fn warm_up<G: TextGenerator>(generator: &mut G, defaults: &GenerationDefaults) -> bool {
    let params = SamplingParams {
        max_tokens: 1,
        ..SamplingParams::from(defaults)
    };
    match generator.generate(WARMUP_PROMPT, &params) {
        Ok(_) => {
            info!("Dummy inference successful.");
            true
        }
        Err(e) => {
            warn!("Dummy inference failed: {}", e);
            false
        }
    }
}

fn log_checkpoint(header: &GGUFReader, model: &ModelSettings) {
    info!(
        version = header.version,
        tensors = header.tensor_count,
        architecture = header.architecture().unwrap_or("unknown"),
        name = header.name().unwrap_or("unknown"),
        "Read GGUF header"
    );

    if let Some(blocks) = header.block_count() {
        let (offloaded, total) = offloaded_layers(model.n_gpu_layers, blocks);
        info!("Offloading {}/{} layers to GPU", offloaded, total);
    }

    if let Some(trained) = header.context_length() {
        if u64::from(model.n_ctx) > trained {
            warn!("n_ctx {} exceeds the model's trained context length {}", model.n_ctx, trained);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiMode, GenerationDefaults};
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingGenerator {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl TextGenerator for CountingGenerator {
        fn generate(&mut self, _prompt: &str, params: &SamplingParams) -> Result<String, GenerateError> {
            assert_eq!(params.max_tokens, 1);
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("out of memory".into())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn model_settings(path: PathBuf, warmup: bool) -> ModelSettings {
        ModelSettings {
            path,
            n_ctx: 4096,
            n_gpu_layers: -1,
            n_batch: 512,
            main_gpu: 0,
            tensor_split: Vec::new(),
            n_threads: None,
            use_mmap: true,
            use_mlock: false,
            warmup,
            api: ApiMode::Completion,
            system_prompt: None,
        }
    }

    fn defaults() -> GenerationDefaults {
        GenerationDefaults {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            stop: vec!["</s>".to_string()],
        }
    }

    fn empty_gguf() -> PathBuf {
        let path = std::env::temp_dir().join(format!("init-test-{}.gguf", uuid::Uuid::new_v4()));
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(crate::gguf::GGUF_MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        std::fs::write(&path, buf).unwrap();
        path
    }

    #[test]
    fn test_missing_file_never_calls_loader() {
        let path = std::env::temp_dir().join("definitely-missing-model.gguf");
        let result = initialize(&model_settings(path.clone(), true), &defaults(), |_| -> Result<CountingGenerator, GenerateError> {
            panic!("loader must not run")
        });
        match result {
            Err(InitError::ModelNotFound(p)) => assert_eq!(p, path),
            _ => panic!("expected ModelNotFound"),
        }
    }

    #[test]
    fn test_non_gguf_file_rejected() {
        let path = std::env::temp_dir().join(format!("init-test-{}.bin", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"definitely not gguf").unwrap();
        let result = initialize(&model_settings(path.clone(), false), &defaults(), |_| -> Result<CountingGenerator, GenerateError> {
            panic!("loader must not run")
        });
        std::fs::remove_file(&path).ok();
        match result {
            Err(e @ InitError::InvalidModel { .. }) => assert!(e.to_string().contains("missing GGUF magic number")),
            _ => panic!("expected InvalidModel"),
        }
    }

    #[test]
    fn test_unsupported_version_rejected_after_magic_check() {
        let path = std::env::temp_dir().join(format!("init-test-{}.gguf", uuid::Uuid::new_v4()));
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(crate::gguf::GGUF_MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(9).unwrap();
        std::fs::write(&path, buf).unwrap();

        let result = initialize(&model_settings(path.clone(), false), &defaults(), |_| -> Result<CountingGenerator, GenerateError> {
            panic!("loader must not run")
        });
        std::fs::remove_file(&path).ok();
        match result {
            Err(e @ InitError::InvalidModel { .. }) => assert!(e.to_string().contains("Unsupported version 9")),
            _ => panic!("expected InvalidModel"),
        }
    }

    #[test]
    fn test_loader_error_is_reported() {
        let path = empty_gguf();
        let result = initialize(&model_settings(path.clone(), false), &defaults(), |_| -> Result<CountingGenerator, GenerateError> {
            Err("cudaMalloc failed".into())
        });
        std::fs::remove_file(&path).ok();
        match result {
            Err(e @ InitError::Load(_)) => assert!(e.to_string().contains("cudaMalloc failed")),
            _ => panic!("expected Load error"),
        }
    }

    #[test]
    fn test_warmup_runs_once_and_failure_is_not_fatal() {
        let path = empty_gguf();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = initialize(&model_settings(path.clone(), true), &defaults(), move |_| {
            Ok(CountingGenerator { calls: counter, fail: true })
        });
        std::fs::remove_file(&path).ok();

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_warmup_disabled() {
        let path = empty_gguf();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = initialize(&model_settings(path.clone(), false), &defaults(), move |_| {
            Ok(CountingGenerator { calls: counter, fail: false })
        });
        std::fs::remove_file(&path).ok();

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
