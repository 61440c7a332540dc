use std::fmt::Debug;
use std::sync::Arc;

use super::cpu::CpuBackend;
use crate::vision::error::ClassifyError;
use crate::vision::tensor::Tensor;

/// A trait for tensor operation backends.
///
/// Model variants are expressed entirely in terms of these kernels, so a
/// hardware-accelerated backend can be swapped in without touching the
/// model code. All kernels are deterministic for fixed inputs.
pub trait Backend: Send + Sync + Debug {
    /// 2D convolution over a CHW input.
    ///
    /// # Parameters
    /// * `input` - Input tensor with shape (in_channels, height, width)
    /// * `weight` - Filter tensor with shape (out_channels, in_channels, kernel_h, kernel_w)
    /// * `bias` - Optional bias tensor with shape (out_channels)
    /// * `stride` - Step between filter applications
    /// * `padding` - Zero padding applied to each spatial border
    fn conv2d(
        &self,
        input: &Tensor,
        weight: &Tensor,
        bias: Option<&Tensor>,
        stride: usize,
        padding: usize,
    ) -> Result<Tensor, ClassifyError>;

    /// Depthwise 2D convolution: each channel is filtered independently.
    ///
    /// # Parameters
    /// * `input` - Input tensor with shape (channels, height, width)
    /// * `weight` - Filter tensor with shape (channels, kernel_h, kernel_w)
    /// * `stride` - Step between filter applications
    /// * `padding` - Zero padding applied to each spatial border
    fn depthwise_conv2d(
        &self,
        input: &Tensor,
        weight: &Tensor,
        stride: usize,
        padding: usize,
    ) -> Result<Tensor, ClassifyError>;

    /// Max pooling over non-overlapping or strided windows of a CHW input.
    fn max_pool2d(
        &self,
        input: &Tensor,
        kernel: usize,
        stride: usize,
    ) -> Result<Tensor, ClassifyError>;

    /// Global max pooling of a CHW input down to one value per channel.
    ///
    /// # Returns
    /// The pooled (channels) tensor and, for each channel, the flat spatial
    /// index of the maximum. The indices let callers route gradients back
    /// to the contributing positions.
    fn global_max_pool(&self, input: &Tensor) -> Result<(Tensor, Vec<usize>), ClassifyError>;

    /// Fully connected layer: y = W x + b.
    ///
    /// # Parameters
    /// * `input` - Input vector with shape (in_features)
    /// * `weight` - Weight matrix with shape (out_features, in_features)
    /// * `bias` - Optional bias vector with shape (out_features)
    fn linear(
        &self,
        input: &Tensor,
        weight: &Tensor,
        bias: Option<&Tensor>,
    ) -> Result<Tensor, ClassifyError>;

    /// Gradient of a fully connected layer with respect to its input:
    /// dx = W^T dy. Used when back-propagating a class score through a
    /// model head for saliency computation.
    fn linear_grad_input(
        &self,
        weight: &Tensor,
        grad_output: &Tensor,
    ) -> Result<Tensor, ClassifyError>;

    /// Applies the rectified linear unit in place.
    fn relu(&self, tensor: &mut Tensor);

    /// Applies softmax in place over a 1D tensor.
    ///
    /// Fails rather than normalizing if the input contains non-finite
    /// values; the caller treats that as an inference failure.
    fn softmax(&self, tensor: &mut Tensor) -> Result<(), ClassifyError>;
}

// Factory function to create a backend based on available hardware
pub fn create_backend() -> Arc<dyn Backend> {
    // In the future, this can check for available hardware and select the best backend
    // For now, only CPU backend is available
    Arc::new(CpuBackend::new())
}
