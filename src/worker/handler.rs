use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{error, info, warn};
use crate::config::GenerationDefaults;
use crate::llm::{InitError, PromptFormat, TextGenerator};
use super::job::{Job, JobInput, JobResult};

pub const NO_PROMPT: &str = "No 'prompt' provided in input.";
pub const MODEL_UNAVAILABLE: &str = "Model failed to load and is unavailable.";

/// Re-runs model initialization when a job arrives and no model is loaded.
pub type Reloader<G> = Box<dyn FnMut() -> Result<G, InitError> + Send>;

/// Turns jobs into results using an explicitly owned model handle.
///
/// Jobs are handled strictly one at a time through `&mut self`. Every failure
/// (bad input, missing model, generation error, panic in the native call)
/// comes back as `JobResult::Error`.
pub struct JobHandler<G: TextGenerator> {
    model: Option<G>,
    reloader: Option<Reloader<G>>,
    defaults: GenerationDefaults,
    format: PromptFormat,
}

impl<G: TextGenerator> JobHandler<G> {
    pub fn new(model: G, defaults: GenerationDefaults, format: PromptFormat) -> Self {
        Self {
            model: Some(model),
            reloader: None,
            defaults,
            format,
        }
    }

    /// A handler whose model failed to load at startup.
    pub fn without_model(defaults: GenerationDefaults, format: PromptFormat) -> Self {
        Self {
            model: None,
            reloader: None,
            defaults,
            format,
        }
    }

    /// Lets jobs retry initialization while no model is loaded.
    pub fn with_reloader<F>(mut self, reloader: F) -> Self
    where
        F: FnMut() -> Result<G, InitError> + Send + 'static,
    {
        self.reloader = Some(Box::new(reloader));
        self
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Handles one job to completion.
    pub fn handle(&mut self, job: &Job) -> JobResult {
        let job_id = job.id.as_deref().unwrap_or("-");

        let input = match JobInput::from_value(&job.input) {
            Ok(input) => input,
            Err(e) => {
                warn!(job_id, "Rejected job with invalid input: {}", e);
                return JobResult::Error(format!("Invalid job input: {}", e));
            }
        };

        let Some(prompt) = input.prompt() else {
            warn!(job_id, "Rejected job without prompt");
            return JobResult::Error(NO_PROMPT.to_string());
        };
        let params = match input.sampling(&self.defaults) {
            Ok(params) => params,
            Err(e) => {
                warn!(job_id, "Rejected job with out-of-range parameters: {}", e);
                return JobResult::Error(format!("Invalid job input: {}", e));
            }
        };

        if let Err(message) = self.ensure_model() {
            return JobResult::Error(message);
        }
        let Some(model) = self.model.as_mut() else {
            return JobResult::Error(MODEL_UNAVAILABLE.to_string());
        };

        info!(job_id, max_tokens = params.max_tokens, "Received job {}. Starting inference...", job_id);
        let start = Instant::now();
        let rendered = self.format.render(prompt);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| model.generate(&rendered, &params)));
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(text)) => {
                info!(job_id, elapsed_secs = elapsed, "Job {} completed in {:.2} seconds.", job_id, elapsed);
                JobResult::Success(text.trim().to_string())
            }
            Ok(Err(e)) => {
                error!(job_id, elapsed_secs = elapsed, "Error during inference for job {}: {}", job_id, e);
                JobResult::Error(format!("Inference failed: {}", e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(job_id, elapsed_secs = elapsed, "Inference panicked for job {}: {}", job_id, message);
                JobResult::Error(format!("Inference failed: {}", message))
            }
        }
    }

    /// Loads the model through the reloader if it is missing.
    fn ensure_model(&mut self) -> Result<(), String> {
        if self.model.is_some() {
            return Ok(());
        }
        let Some(reloader) = self.reloader.as_mut() else {
            error!("Model not initialized and no reload is configured");
            return Err(MODEL_UNAVAILABLE.to_string());
        };

        warn!("Model not initialized. Attempting to initialize...");
        match reloader() {
            Ok(model) => {
                info!("Model initialized during request");
                self.model = Some(model);
                Ok(())
            }
            Err(e) => {
                error!("Model initialization failed during request: {}", e);
                Err(format!("Model initialization failed during request: {}", e))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "native generation call panicked".to_string()
    }
}
