mod custom_cnn;
mod handle;
mod xception;

pub use custom_cnn::CustomCnn;
pub use handle::{ActivationGradients, ModelHandle, ModelKind};
pub use xception::XceptionTransfer;
