mod reader;
mod types;

// Re-export from types
pub use types::{TensorInfo, WeightDType, WeightsError};
// Re-export from reader
pub use reader::{is_weights_file, WeightsReader};
