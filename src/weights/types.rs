use std::fmt::{self};
use std::error::Error;
use serde::{Serialize, Deserialize};

/// Custom error types for weight-container operations
#[derive(Debug)]
pub enum WeightsError {
    /// Wraps std::io::Error for file operations
    IoError(std::io::Error),
    /// Invalid format errors with a message
    InvalidFormat(String),
    /// Missing metadata key errors
    MetadataNotFound(String),
    /// Missing tensor errors
    TensorNotFound(String),
}

/// Implements Display trait for WeightsError for error reporting
impl fmt::Display for WeightsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WeightsError::IoError(e) => write!(f, "I/O error: {}", e),
            WeightsError::InvalidFormat(msg) => write!(f, "Invalid weight container: {}", msg),
            WeightsError::MetadataNotFound(key) => write!(f, "Metadata key not found: {}", key),
            WeightsError::TensorNotFound(name) => write!(f, "Tensor not found: {}", name),
        }
    }
}

/// Implements Error trait to allow WeightsError to be used as a standard error type
impl Error for WeightsError {}

/// Allows automatic conversion from std::io::Error to WeightsError
impl From<std::io::Error> for WeightsError {
    fn from(err: std::io::Error) -> Self {
        WeightsError::IoError(err)
    }
}

/// Element types a weight container may store.
///
/// Only FLOAT32 is produced by the current export path; the tag exists so
/// readers can reject containers written by a newer exporter instead of
/// misreading their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightDType {
    FLOAT32 = 0,
}

impl WeightDType {
    /// Size of one element in bytes
    pub fn element_size(&self) -> usize {
        match self {
            WeightDType::FLOAT32 => 4,
        }
    }

    /// Convert the dtype to a string representation
    pub fn type_string(&self) -> String {
        match self {
            WeightDType::FLOAT32 => "Float32",
        }.to_string()
    }
}

impl TryFrom<u32> for WeightDType {
    type Error = WeightsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WeightDType::FLOAT32),
            _ => Err(WeightsError::InvalidFormat(format!("Unknown tensor dtype tag: {}", value))),
        }
    }
}

/// Information about a tensor in the weight container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorInfo {
    /// Name/label of the tensor
    pub name: String,
    /// Size of each dimension
    pub dims: Vec<u64>,
    /// Element type of the tensor
    pub dtype: WeightDType,
    /// Offset into the data section where tensor data begins, in bytes
    pub offset: u64,
}

impl TensorInfo {
    /// Total number of elements in the tensor
    pub fn element_count(&self) -> usize {
        self.dims.iter().product::<u64>() as usize
    }
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.dims.iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(" x "))
    }
}
