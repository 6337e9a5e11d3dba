//! Job intake: the records exchanged with the serverless runtime and the
//! handler that runs them against the loaded model.

mod handler;
mod job;

pub use handler::{JobHandler, Reloader, MODEL_UNAVAILABLE, NO_PROMPT};
pub use job::{Job, JobInput, JobResult, StopSequences};
