use std::fmt::{self, Debug};

use crate::vision::error::ClassifyError;

/// A tensor representing a multi-dimensional array
#[derive(Clone, PartialEq)]
pub struct Tensor {
    /// The raw data as a contiguous array of f32 values, row-major
    data: Vec<f32>,
    /// The shape of the tensor (e.g., [channels, height, width])
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with the given data and shape
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, ClassifyError> {
        let total_elements: usize = shape.iter().product();
        if data.len() != total_elements {
            return Err(ClassifyError::Inference(format!(
                "Data length ({}) does not match shape {:?} (expected {})",
                data.len(), shape, total_elements
            )));
        }
        Ok(Self { data, shape })
    }

    /// Create a new tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        Self {
            data: vec![0.0; size],
            shape,
        }
    }

    /// Get a reference to the tensor's raw data
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Get a mutable reference to the tensor's raw data
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Get the shape of the tensor
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the size (total number of elements) in the tensor
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Reshape the tensor to a new shape with the same total number of elements
    pub fn reshape(&self, new_shape: Vec<usize>) -> Result<Self, ClassifyError> {
        let new_size: usize = new_shape.iter().product();
        if new_size != self.size() {
            return Err(ClassifyError::Inference(format!(
                "Cannot reshape tensor of size {} to shape {:?} (size {})",
                self.size(), new_shape, new_size
            )));
        }

        Ok(Self {
            data: self.data.clone(),
            shape: new_shape,
        })
    }

    /// True if any element is NaN or infinite
    pub fn has_non_finite(&self) -> bool {
        self.data.iter().any(|v| !v.is_finite())
    }

    /// Consume the tensor, returning its raw data
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

impl Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor {{ shape: {:?}, data: truncated }}", self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_shape() {
        assert!(Tensor::new(vec![1.0, 2.0, 3.0], vec![2, 2]).is_err());
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.size(), 4);
    }

    #[test]
    fn test_reshape_preserves_elements() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap();
        let r = t.reshape(vec![6]).unwrap();
        assert_eq!(r.data(), t.data());
        assert!(t.reshape(vec![4]).is_err());
    }

    #[test]
    fn test_has_non_finite() {
        let mut t = Tensor::zeros(vec![3]);
        assert!(!t.has_non_finite());
        t.data_mut()[1] = f32::NAN;
        assert!(t.has_non_finite());
    }
}
