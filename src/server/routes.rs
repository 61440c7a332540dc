use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::{error, info};

use crate::vision::engine::InferenceEngine;
use crate::vision::error::ClassifyError;
use crate::vision::registry::ModelEntry;
use super::types::{ApiResponse, ClassifyRequest, ClassifyResponse};

/// Returns a health check response
pub async fn health_check() -> &'static str {
    "neuroscan is running!"
}

/// Returns the models loaded in the registry in JSON format.
pub async fn list_models(State(engine): State<Arc<InferenceEngine>>) -> impl IntoResponse {
    let models: Vec<ModelEntry> = engine.registry().entries().to_vec();

    let response = ApiResponse {
        status: "success".to_string(),
        data: Some(models),
        message: None,
    };

    (StatusCode::OK, Json(response))
}

/// Handles the classify endpoint.
///
/// Decodes the base64 payload, runs the pipeline on a blocking worker so
/// inference does not stall the async executor, and maps typed errors to
/// status codes: user-correctable failures are 400, everything else 500.
pub async fn classify(
    State(engine): State<Arc<InferenceEngine>>,
    Json(request): Json<ClassifyRequest>,
) -> impl IntoResponse {
    info!("Classify endpoint called with model id: {}", request.model_id);

    let raw = match BASE64.decode(request.image.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Image payload is not valid base64: {}", e),
            );
        }
    };

    // Decode and inference are CPU-bound; run them off the async executor
    let model_id = request.model_id.clone();
    let engine_ref = Arc::clone(&engine);
    let outcome = tokio::task::spawn_blocking(move || engine_ref.classify(&raw, &model_id)).await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!("Classification task panicked: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Classification failed".to_string(),
            );
        }
    };

    match result {
        Ok(result) => {
            let response = ClassifyResponse {
                request_id: result.request_id.clone(),
                predicted_label: result.predicted_label(),
                probabilities: result.probabilities().clone(),
                overlay_image: BASE64.encode(&result.overlay_png),
            };
            (
                StatusCode::OK,
                Json(ApiResponse {
                    status: "success".to_string(),
                    data: Some(response),
                    message: None,
                }),
            )
        }
        Err(e) if e.is_user_error() => {
            info!("Rejected classification request: {}", e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            // Internal failures are logged in full but surfaced generically
            error!("Classification failed: {}", e);
            let message = match e {
                ClassifyError::Inference(_) => "Classification failed",
                _ => "Internal error",
            };
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
        }
    }
}

fn error_response(
    status: StatusCode,
    message: String,
) -> (StatusCode, Json<ApiResponse<ClassifyResponse>>) {
    (
        status,
        Json(ApiResponse {
            status: "error".to_string(),
            data: None,
            message: Some(message),
        }),
    )
}
