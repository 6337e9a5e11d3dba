use llama_cpp::{LlamaModel, LlamaParams, SplitMode};
use tracing::{info, warn};
use crate::config::ModelSettings;
use crate::llm::generator::{GenerateError, SamplingParams, TextGenerator};
use crate::llm::offload::{gpu_layers_param, split_across_gpus};
use crate::llm::session::{self, SessionSettings};

/// A GGUF checkpoint loaded into llama.cpp.
///
/// The model weights are loaded once; every `generate` call opens a fresh
/// session on top of them so jobs never see each other's context.
pub struct LlamaGenerator {
    model: LlamaModel,
    session: SessionSettings,
}

impl LlamaGenerator {
    /// Loads the checkpoint at `settings.path` with the configured GPU placement.
    pub fn load(settings: &ModelSettings) -> Result<Self, GenerateError> {
        let n_gpu_layers = gpu_layers_param(settings.n_gpu_layers);
        let split_mode = if split_across_gpus(&settings.tensor_split) {
            warn!(
                tensor_split = ?settings.tensor_split,
                "Per-GPU split ratios are not supported by the llama_cpp bindings; splitting layers across all GPUs"
            );
            SplitMode::Layer
        } else {
            SplitMode::None
        };
        let llama_params = LlamaParams {
            n_gpu_layers,
            split_mode,
            main_gpu: settings.main_gpu,
            use_mmap: settings.use_mmap,
            use_mlock: settings.use_mlock,
            ..Default::default()
        };
        info!(
            n_gpu_layers = settings.n_gpu_layers,
            main_gpu = settings.main_gpu,
            split_layers = split_across_gpus(&settings.tensor_split),
            use_mmap = settings.use_mmap,
            use_mlock = settings.use_mlock,
            "Loading model via llama_cpp: {}",
            settings.path.display()
        );

        let model = LlamaModel::load_from_file(&settings.path, llama_params)
            .map_err(|e| format!("Failed to load model with llama_cpp: {}", e))?;

        Ok(Self {
            model,
            session: SessionSettings::from(settings),
        })
    }
}

impl TextGenerator for LlamaGenerator {
    fn generate(&mut self, prompt: &str, params: &SamplingParams) -> Result<String, GenerateError> {
        session::complete(&self.model, &self.session, prompt, params)
    }
}
