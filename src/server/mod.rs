mod routes;
mod server;
mod types;

pub use routes::{health_check, runsync};
pub use server::{ApiServer, AppState};
pub use types::{HealthResponse, RunResponse, STATUS_COMPLETED, STATUS_FAILED};
