use std::error::Error;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use axum::{routing::{get, post}, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::OutputField;
use crate::llm::TextGenerator;
use crate::worker::JobHandler;
use super::routes;

/// Shared state behind every route
pub struct AppState<G: TextGenerator> {
    pub handler: Arc<Mutex<JobHandler<G>>>,
    /// Mirrors `JobHandler::is_model_loaded`, refreshed after every job
    pub model_loaded: Arc<AtomicBool>,
    pub output_field: OutputField,
}

impl<G: TextGenerator> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            model_loaded: Arc::clone(&self.model_loaded),
            output_field: self.output_field,
        }
    }
}

impl<G: TextGenerator> AppState<G> {
    pub fn new(handler: JobHandler<G>, output_field: OutputField) -> Self {
        let model_loaded = Arc::new(AtomicBool::new(handler.is_model_loaded()));
        Self {
            handler: Arc::new(Mutex::new(handler)),
            model_loaded,
            output_field,
        }
    }
}

/// Local HTTP endpoint for running jobs against the worker
pub struct ApiServer<G: TextGenerator> {
    state: AppState<G>,
    host: String,
    port: u16,
}

impl<G: TextGenerator + 'static> ApiServer<G> {
    pub fn new(state: AppState<G>, host: String, port: u16) -> Self {
        info!("Creating new API server on {}:{}", host, port);
        Self { state, host, port }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health_check::<G>))
            .route("/runsync", post(routes::runsync::<G>))
            .with_state(self.state.clone())
    }

    pub async fn start(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let app = self.router();

        info!("Starting server on {}:{}", self.host, self.port);
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;

        info!("Server started successfully");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
