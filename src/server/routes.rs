use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::llm::TextGenerator;
use crate::worker::Job;
use super::server::AppState;
use super::types::{HealthResponse, RunResponse, STATUS_COMPLETED, STATUS_FAILED};

/// Runs one job synchronously and returns its output.
///
/// Jobs queue on the handler lock, so at most one generation runs at a time.
pub async fn runsync<G>(State(state): State<AppState<G>>, Json(mut job): Json<Job>) -> impl IntoResponse
where
    G: TextGenerator + 'static,
{
    let id = job.id.get_or_insert_with(|| Uuid::new_v4().to_string()).clone();
    info!("Runsync endpoint called for job {}", id);

    let guard = Arc::clone(&state.handler).lock_owned().await;
    let model_loaded = Arc::clone(&state.model_loaded);
    let outcome = tokio::task::spawn_blocking(move || {
        let mut handler = guard;
        let result = handler.handle(&job);
        model_loaded.store(handler.is_model_loaded(), Ordering::SeqCst);
        result
    })
    .await;

    match outcome {
        Ok(result) => {
            let status = if result.is_success() { STATUS_COMPLETED } else { STATUS_FAILED };
            let response = RunResponse {
                id,
                status: status.to_string(),
                output: result.to_output(state.output_field),
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            error!("Job {} did not run to completion: {}", id, e);
            let response = RunResponse {
                id,
                status: STATUS_FAILED.to_string(),
                output: json!({ "error": format!("Job execution failed: {}", e) }),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response))
        }
    }
}

/// Reports liveness without waiting for a running job.
pub async fn health_check<G>(State(state): State<AppState<G>>) -> Json<HealthResponse>
where
    G: TextGenerator + 'static,
{
    let response = HealthResponse {
        status: "ok".to_string(),
        busy: state.handler.try_lock().is_err(),
        model_loaded: state.model_loaded.load(Ordering::SeqCst),
    };
    Json(response)
}
