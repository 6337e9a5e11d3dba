use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a job that ran to completion and produced a result
pub const STATUS_COMPLETED: &str = "COMPLETED";
/// Status of a job whose result is an error
pub const STATUS_FAILED: &str = "FAILED";

/// Response for `/runsync`, shaped like the hosted runtime's sync endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: String,
    pub status: String,
    pub output: Value,
}

/// Response for `/health`
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// A job currently holds the model
    pub busy: bool,
    pub model_loaded: bool,
}
