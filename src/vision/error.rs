use std::error::Error;
use std::fmt;

/// Custom error types for the classification pipeline
#[derive(Debug)]
pub enum ClassifyError {
    /// The input bytes are not a decodable image (user-correctable)
    Decode(String),
    /// The requested model identifier is not recognized (user-correctable)
    UnknownModel(String),
    /// Numerical or runtime failure inside a model
    Inference(String),
    /// The handle does not expose the internal access saliency needs.
    /// Handles produced by a correctly configured registry always do.
    SaliencyUnavailable(String),
    /// An internal consistency invariant was violated upstream
    InvariantViolation(String),
}

/// Implements Display trait for ClassifyError for error reporting
impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClassifyError::Decode(msg) => write!(f, "Image decode failed: {}", msg),
            ClassifyError::UnknownModel(id) => write!(f, "Unknown model identifier: {}", id),
            ClassifyError::Inference(msg) => write!(f, "Inference failed: {}", msg),
            ClassifyError::SaliencyUnavailable(msg) => {
                write!(f, "Saliency computation unavailable: {}", msg)
            }
            ClassifyError::InvariantViolation(msg) => {
                write!(f, "Internal invariant violated: {}", msg)
            }
        }
    }
}

/// Implements Error trait to allow ClassifyError to be used as a standard error type
impl Error for ClassifyError {}

/// Allows automatic conversion from image decoding errors
impl From<image::ImageError> for ClassifyError {
    fn from(err: image::ImageError) -> Self {
        ClassifyError::Decode(err.to_string())
    }
}

impl ClassifyError {
    /// True for errors the caller can fix by changing the request.
    /// The serving layer maps these to 400 responses and the rest to 500.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ClassifyError::Decode(_) | ClassifyError::UnknownModel(_))
    }
}
