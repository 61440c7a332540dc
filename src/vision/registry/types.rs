use serde::Serialize;
use chrono::{DateTime, Utc, serde::ts_seconds};

/// Describes one loaded model for listings.
///
/// This is presentation metadata only; the runtime state lives in the
/// registry's handle table.
#[derive(Debug, Serialize, Clone)]
pub struct ModelEntry {
    /// Identifier requests select the model with
    pub id: String,
    /// Human-readable name of the model
    pub name: String,
    /// Architecture family of the model
    pub architecture: String,
    /// Weight-container filename the model was loaded from
    pub filename: String,
    /// Input extent (square side length in pixels)
    pub input_size: u32,
    /// Pixel rescaling policy the model was trained with
    pub normalization: String,
    /// Number of tensors in the container
    pub tensor_count: u64,
    /// When the model was loaded
    #[serde(with = "ts_seconds")]
    pub loaded_at: DateTime<Utc>,
}
