use serde::{Deserialize, Serialize};

use crate::vision::labels::{ClassLabel, ProbabilityVector};

/// Request for scan classification
#[derive(Deserialize)]
pub struct ClassifyRequest {
    /// Base64-encoded image bytes (PNG or JPEG)
    pub image: String,
    /// Identifier of the classifier to use
    pub model_id: String,
}

/// Response for scan classification
#[derive(Serialize)]
pub struct ClassifyResponse {
    /// Identifier correlating the response with server logs
    pub request_id: String,
    /// Predicted class label
    pub predicted_label: ClassLabel,
    /// Ordered label-to-probability map
    pub probabilities: ProbabilityVector,
    /// Base64-encoded PNG of the saliency overlay
    pub overlay_image: String,
}

/// Generic API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub data: Option<T>,
    pub message: Option<String>,
}
