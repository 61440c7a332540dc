use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use axum::{Router, routing::{get, post}};
use tracing::info;

use crate::vision::engine::InferenceEngine;
use super::routes;

/// API Server for handling scan classification requests
pub struct ApiServer {
    engine: Arc<InferenceEngine>,
    host: String,
    port: u16,
}

impl ApiServer {
    pub fn new(engine: InferenceEngine, host: String, port: u16) -> Self {
        info!("Creating new API server on {}:{}", host, port);
        Self {
            engine: Arc::new(engine),
            host,
            port,
        }
    }

    pub async fn start(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let app_state = Arc::clone(&self.engine);

        let app = Router::new()
            .route("/api/v1/classify", post(routes::classify))
            .route("/api/v1/models", get(routes::list_models))
            .route("/api/v1/health", get(routes::health_check))
            .with_state(app_state);

        info!("Starting server on {}:{}", self.host, self.port);
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;

        info!("Server started successfully\n");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
