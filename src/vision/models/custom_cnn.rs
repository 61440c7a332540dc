use std::error::Error;
use std::sync::Arc;

use crate::vision::backend::Backend;
use crate::vision::error::ClassifyError;
use crate::vision::labels::{ProbabilityVector, CLASS_COUNT};
use crate::vision::models::handle::{ActivationGradients, ModelHandle, ModelKind};
use crate::vision::normalize::{InputShape, NormalizationPolicy, ScanImage};
use crate::vision::tensor::Tensor;
use crate::weights::WeightsReader;

/// One convolution stage of the custom network: 3x3 same-padding
/// convolution, ReLU, then 2x2 max pooling.
struct ConvBlock {
    weight: Tensor,
    bias: Tensor,
}

/// The lightweight from-scratch classifier.
///
/// Architecture: a stack of `ConvBlock`s, flatten, one hidden dense layer
/// with ReLU, and a final dense layer producing one logit per class. The
/// feature map entering the flatten is the layer saliency is computed
/// against.
pub struct CustomCnn {
    backend: Arc<dyn Backend>,
    input_shape: InputShape,
    blocks: Vec<ConvBlock>,
    fc1_weight: Tensor,
    fc1_bias: Tensor,
    fc2_weight: Tensor,
    fc2_bias: Tensor,
}

impl CustomCnn {
    /// Builds the model from a weight container.
    ///
    /// Convolution stages are discovered by name (`conv1.weight`,
    /// `conv2.weight`, ...) until the first gap; the head is always
    /// `fc1.*`/`fc2.*`. The container's `vision.input_size` metadata
    /// declares the expected input extent.
    pub fn from_container(
        reader: &WeightsReader,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let input_size: usize = reader.metadata_value("vision.input_size")?.parse()?;

        let mut blocks = Vec::new();
        let mut index = 1;
        while reader.tensor_info(&format!("conv{}.weight", index)).is_ok() {
            let w_info = reader.tensor_info(&format!("conv{}.weight", index))?.clone();
            let weight = Tensor::new(
                reader.tensor_f32(&format!("conv{}.weight", index))?,
                w_info.dims.iter().map(|&d| d as usize).collect(),
            )?;
            let b_info = reader.tensor_info(&format!("conv{}.bias", index))?.clone();
            let bias = Tensor::new(
                reader.tensor_f32(&format!("conv{}.bias", index))?,
                b_info.dims.iter().map(|&d| d as usize).collect(),
            )?;
            blocks.push((weight, bias));
            index += 1;
        }

        let dense = |name: &str| -> Result<Tensor, Box<dyn Error + Send + Sync>> {
            let info = reader.tensor_info(name)?.clone();
            Ok(Tensor::new(
                reader.tensor_f32(name)?,
                info.dims.iter().map(|&d| d as usize).collect(),
            )?)
        };

        Ok(Self::from_parts(
            backend,
            InputShape::square_rgb(input_size),
            blocks,
            dense("fc1.weight")?,
            dense("fc1.bias")?,
            dense("fc2.weight")?,
            dense("fc2.bias")?,
        )?)
    }

    /// Builds the model from already-loaded tensors, validating that the
    /// layer shapes chain together for the declared input extent.
    pub fn from_parts(
        backend: Arc<dyn Backend>,
        input_shape: InputShape,
        blocks: Vec<(Tensor, Tensor)>,
        fc1_weight: Tensor,
        fc1_bias: Tensor,
        fc2_weight: Tensor,
        fc2_bias: Tensor,
    ) -> Result<Self, ClassifyError> {
        if blocks.is_empty() {
            return Err(ClassifyError::Inference(
                "Custom CNN needs at least one convolution stage".to_string(),
            ));
        }

        // Walk the stack, tracking channels and spatial extent
        let mut channels = input_shape.channels;
        let mut extent = (input_shape.height, input_shape.width);
        for (i, (weight, bias)) in blocks.iter().enumerate() {
            let shape = weight.shape();
            if shape.len() != 4 || shape[1] != channels {
                return Err(ClassifyError::Inference(format!(
                    "Convolution stage {} weight shape {:?} does not accept {} channels",
                    i + 1, shape, channels
                )));
            }
            // Forward runs 3x3 filters with same-padding; the extent math
            // below depends on it
            if shape[2] != 3 || shape[3] != 3 {
                return Err(ClassifyError::Inference(format!(
                    "Convolution stage {} kernel is {}x{}, expected 3x3",
                    i + 1, shape[2], shape[3]
                )));
            }
            if bias.shape() != [shape[0]] {
                return Err(ClassifyError::Inference(format!(
                    "Convolution stage {} bias shape {:?} does not match {} filters",
                    i + 1, bias.shape(), shape[0]
                )));
            }
            channels = shape[0];
            // Same-padding convolution preserves extent; 2x2 pooling halves it
            extent = (extent.0 / 2, extent.1 / 2);
            if extent.0 == 0 || extent.1 == 0 {
                return Err(ClassifyError::Inference(format!(
                    "Input extent {}x{} too small for {} pooling stages",
                    input_shape.height, input_shape.width, blocks.len()
                )));
            }
        }

        let flat = channels * extent.0 * extent.1;
        if fc1_weight.shape().len() != 2 || fc1_weight.shape()[1] != flat {
            return Err(ClassifyError::Inference(format!(
                "Hidden layer expects {:?} inputs, feature map flattens to {}",
                fc1_weight.shape(), flat
            )));
        }
        let hidden = fc1_weight.shape()[0];
        if fc2_weight.shape() != [CLASS_COUNT, hidden] {
            return Err(ClassifyError::Inference(format!(
                "Output layer shape {:?} does not map {} hidden units to {} classes",
                fc2_weight.shape(), hidden, CLASS_COUNT
            )));
        }

        Ok(Self {
            backend,
            input_shape,
            blocks: blocks
                .into_iter()
                .map(|(weight, bias)| ConvBlock { weight, bias })
                .collect(),
            fc1_weight,
            fc1_bias,
            fc2_weight,
            fc2_bias,
        })
    }

    fn check_scan(&self, scan: &ScanImage) -> Result<(), ClassifyError> {
        let expected = [self.input_shape.channels, self.input_shape.height, self.input_shape.width];
        if scan.tensor().shape() != expected {
            return Err(ClassifyError::InvariantViolation(format!(
                "Scan tensor shape {:?} does not match model input {:?}",
                scan.tensor().shape(), expected
            )));
        }
        Ok(())
    }

    /// Forward pass through the convolution stack only
    fn features(&self, input: &Tensor) -> Result<Tensor, ClassifyError> {
        let mut x = input.clone();
        for block in &self.blocks {
            x = self.backend.conv2d(&x, &block.weight, Some(&block.bias), 1, 1)?;
            self.backend.relu(&mut x);
            x = self.backend.max_pool2d(&x, 2, 2)?;
        }
        Ok(x)
    }

    /// Head forward pass: returns logits and the hidden pre-activation,
    /// which the gradient path needs for its ReLU mask.
    fn head(&self, features: &Tensor) -> Result<(Tensor, Tensor), ClassifyError> {
        let flat = features.reshape(vec![features.size()])?;
        let pre_hidden = self.backend.linear(&flat, &self.fc1_weight, Some(&self.fc1_bias))?;
        let mut hidden = pre_hidden.clone();
        self.backend.relu(&mut hidden);
        let logits = self.backend.linear(&hidden, &self.fc2_weight, Some(&self.fc2_bias))?;
        Ok((logits, pre_hidden))
    }

    /// Raw pre-softmax class scores
    fn logits(&self, scan: &ScanImage) -> Result<Tensor, ClassifyError> {
        self.check_scan(scan)?;
        let features = self.features(scan.tensor())?;
        let (logits, _) = self.head(&features)?;
        Ok(logits)
    }
}

impl ModelHandle for CustomCnn {
    fn kind(&self) -> ModelKind {
        ModelKind::CustomCnn
    }

    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn normalization(&self) -> NormalizationPolicy {
        NormalizationPolicy::ZeroToOne
    }

    fn predict(&self, scan: &ScanImage) -> Result<ProbabilityVector, ClassifyError> {
        let mut logits = self.logits(scan)?;
        self.backend.softmax(&mut logits)?;
        ProbabilityVector::new(logits.into_data())
    }

    fn activation_gradients(
        &self,
        scan: &ScanImage,
        class_index: usize,
    ) -> Result<ActivationGradients, ClassifyError> {
        self.check_scan(scan)?;

        let features = self.features(scan.tensor())?;
        let (_, pre_hidden) = self.head(&features)?;

        // d(score)/d(hidden) is the class row of the output weights,
        // masked by the hidden ReLU
        let hidden = self.fc2_weight.shape()[1];
        let row = self.fc2_weight.data()[class_index * hidden..(class_index + 1) * hidden].to_vec();
        let mut grad_hidden = Tensor::new(row, vec![hidden])?;
        for (g, pre) in grad_hidden.data_mut().iter_mut().zip(pre_hidden.data()) {
            if *pre <= 0.0 {
                *g = 0.0;
            }
        }

        // Pull the gradient back through the hidden layer and unflatten
        let grad_flat = self.backend.linear_grad_input(&self.fc1_weight, &grad_hidden)?;
        let gradients = grad_flat.reshape(features.shape().to_vec())?;

        Ok(ActivationGradients { activations: features, gradients })
    }
}
