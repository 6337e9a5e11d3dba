// Declare submodules
pub mod generator;
pub mod init;
pub mod offload;
pub mod prompt;
#[cfg(feature = "llama")]
pub mod engine;
#[cfg(feature = "llama")]
pub mod session;

// Re-export types for external use
pub use generator::{GenerateError, SamplingParams, TextGenerator};
pub use init::{initialize, InitError};
pub use prompt::PromptFormat;
#[cfg(feature = "llama")]
pub use engine::LlamaGenerator;
