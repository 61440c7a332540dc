// Declare submodules
pub mod backend;
pub mod engine;
pub mod error;
pub mod labels;
pub mod models;
pub mod normalize;
pub mod overlay;
pub mod registry;
pub mod result;
pub mod saliency;
pub mod tensor;

// Re-export types for external use
pub use engine::InferenceEngine;
pub use error::ClassifyError;
pub use labels::{ClassLabel, ProbabilityVector};
pub use models::ModelHandle;
pub use registry::ModelRegistry;
pub use result::ClassificationResult;
