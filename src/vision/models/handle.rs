use crate::vision::error::ClassifyError;
use crate::vision::labels::ProbabilityVector;
use crate::vision::normalize::{InputShape, NormalizationPolicy, ScanImage};
use crate::vision::tensor::Tensor;

/// The closed set of recognized classifier variants.
///
/// Extending the system means adding a variant here and an entry in the
/// registry configuration; identifiers arriving in requests are parsed
/// against this enumeration and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Transfer-learned separable-convolution network
    XceptionTransfer,
    /// Lightweight convolutional network trained from scratch
    CustomCnn,
}

impl ModelKind {
    /// Parses a request-supplied identifier
    pub fn from_id(id: &str) -> Option<ModelKind> {
        match id {
            "xception" => Some(ModelKind::XceptionTransfer),
            "custom-cnn" => Some(ModelKind::CustomCnn),
            _ => None,
        }
    }

    /// The canonical identifier used in requests and configuration
    pub fn id(&self) -> &'static str {
        match self {
            ModelKind::XceptionTransfer => "xception",
            ModelKind::CustomCnn => "custom-cnn",
        }
    }

    /// Human-readable name for listings
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::XceptionTransfer => "Transfer-learned Xception",
            ModelKind::CustomCnn => "Custom CNN",
        }
    }
}

/// An intermediate feature map paired with the gradient of one class
/// score with respect to it.
///
/// Both tensors share the same (channels, height, width) shape. This is
/// the entire surface the saliency generator sees of a model's internals.
pub struct ActivationGradients {
    /// The model's last convolutional feature map for the given input
    pub activations: Tensor,
    /// d(class score) / d(activations), computed through the model's head
    pub gradients: Tensor,
}

/// The capability set every classifier variant implements.
///
/// Handles are stateless with respect to individual requests: all methods
/// take `&self` and may be called concurrently. Parameters are owned by
/// the handle for the process lifetime and are never mutated.
pub trait ModelHandle: Send + Sync {
    /// Which variant this handle is
    fn kind(&self) -> ModelKind;

    /// The input geometry the model was trained with
    fn input_shape(&self) -> InputShape;

    /// The pixel rescaling the model was trained with
    fn normalization(&self) -> NormalizationPolicy;

    /// Runs a forward pass, returning the softmax-normalized class
    /// distribution.
    ///
    /// # Arguments
    ///
    /// * `scan` - A scan normalized to this handle's input shape and policy
    fn predict(&self, scan: &ScanImage) -> Result<ProbabilityVector, ClassifyError>;

    /// Computes the internal feature map and the gradient of the
    /// pre-softmax score for `class_index` with respect to it.
    ///
    /// Fails with `ClassifyError::SaliencyUnavailable` for handles that do
    /// not expose their internals; registry-built handles always do.
    fn activation_gradients(
        &self,
        scan: &ScanImage,
        class_index: usize,
    ) -> Result<ActivationGradients, ClassifyError>;
}
