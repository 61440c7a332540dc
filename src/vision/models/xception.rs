use std::error::Error;
use std::sync::Arc;

use crate::vision::backend::Backend;
use crate::vision::error::ClassifyError;
use crate::vision::labels::{ProbabilityVector, CLASS_COUNT};
use crate::vision::models::handle::{ActivationGradients, ModelHandle, ModelKind};
use crate::vision::normalize::{InputShape, NormalizationPolicy, ScanImage};
use crate::vision::tensor::Tensor;
use crate::weights::WeightsReader;

/// One separable-convolution stage: depthwise 3x3 filter, pointwise 1x1
/// projection with bias, ReLU, and optional 2x2 max pooling.
///
/// Batch normalization from the exported network is folded into the
/// pointwise weights and bias at export time, so no normalization state
/// exists at inference.
struct SeparableBlock {
    depthwise: Tensor,
    pointwise: Tensor,
    bias: Tensor,
    pool: bool,
}

/// The transfer-learned separable-convolution classifier.
///
/// An entry convolution (stride 2) feeds a chain of separable blocks; the
/// last block's output is the feature map saliency is computed against.
/// The head follows the transfer-learning recipe: global max pooling, a
/// 128-unit ReLU dense layer, and a dense layer with one logit per class.
pub struct XceptionTransfer {
    backend: Arc<dyn Backend>,
    input_shape: InputShape,
    entry_weight: Tensor,
    entry_bias: Tensor,
    blocks: Vec<SeparableBlock>,
    fc1_weight: Tensor,
    fc1_bias: Tensor,
    fc2_weight: Tensor,
    fc2_bias: Tensor,
}

impl XceptionTransfer {
    /// Builds the model from a weight container.
    ///
    /// Separable blocks are discovered by name (`sep1.*`, `sep2.*`, ...)
    /// until the first gap. Every block pools except the last, which keeps
    /// the feature map at a resolution useful for saliency.
    pub fn from_container(
        reader: &WeightsReader,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let input_size: usize = reader.metadata_value("vision.input_size")?.parse()?;

        let load = |name: &str| -> Result<Tensor, Box<dyn Error + Send + Sync>> {
            let info = reader.tensor_info(name)?.clone();
            Ok(Tensor::new(
                reader.tensor_f32(name)?,
                info.dims.iter().map(|&d| d as usize).collect(),
            )?)
        };

        let mut raw_blocks = Vec::new();
        let mut index = 1;
        while reader.tensor_info(&format!("sep{}.depthwise", index)).is_ok() {
            raw_blocks.push((
                load(&format!("sep{}.depthwise", index))?,
                load(&format!("sep{}.pointwise", index))?,
                load(&format!("sep{}.bias", index))?,
            ));
            index += 1;
        }

        Ok(Self::from_parts(
            backend,
            InputShape::square_rgb(input_size),
            load("entry.weight")?,
            load("entry.bias")?,
            raw_blocks,
            load("head.fc1.weight")?,
            load("head.fc1.bias")?,
            load("head.fc2.weight")?,
            load("head.fc2.bias")?,
        )?)
    }

    /// Builds the model from already-loaded tensors, validating that the
    /// layer shapes chain together.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        backend: Arc<dyn Backend>,
        input_shape: InputShape,
        entry_weight: Tensor,
        entry_bias: Tensor,
        blocks: Vec<(Tensor, Tensor, Tensor)>,
        fc1_weight: Tensor,
        fc1_bias: Tensor,
        fc2_weight: Tensor,
        fc2_bias: Tensor,
    ) -> Result<Self, ClassifyError> {
        if blocks.is_empty() {
            return Err(ClassifyError::Inference(
                "Separable network needs at least one block".to_string(),
            ));
        }

        let entry_shape = entry_weight.shape();
        if entry_shape.len() != 4 || entry_shape[1] != input_shape.channels {
            return Err(ClassifyError::Inference(format!(
                "Entry convolution shape {:?} does not accept {} channels",
                entry_shape, input_shape.channels
            )));
        }

        let mut channels = entry_shape[0];
        let block_count = blocks.len();
        let blocks: Vec<SeparableBlock> = blocks
            .into_iter()
            .enumerate()
            .map(|(i, (depthwise, pointwise, bias))| {
                if depthwise.shape().len() != 3
                    || depthwise.shape()[0] != channels
                    || depthwise.shape()[1] != 3
                    || depthwise.shape()[2] != 3
                {
                    return Err(ClassifyError::Inference(format!(
                        "Block {} depthwise shape {:?} is not a 3x3 filter over {} channels",
                        i + 1, depthwise.shape(), channels
                    )));
                }
                let p_shape = pointwise.shape();
                if p_shape.len() != 4 || p_shape[1] != channels || p_shape[2] != 1 || p_shape[3] != 1 {
                    return Err(ClassifyError::Inference(format!(
                        "Block {} pointwise shape {:?} is not a 1x1 projection of {} channels",
                        i + 1, p_shape, channels
                    )));
                }
                if bias.shape() != [p_shape[0]] {
                    return Err(ClassifyError::Inference(format!(
                        "Block {} bias shape {:?} does not match {} filters",
                        i + 1, bias.shape(), p_shape[0]
                    )));
                }
                channels = p_shape[0];
                Ok(SeparableBlock {
                    depthwise,
                    pointwise,
                    bias,
                    pool: i + 1 < block_count,
                })
            })
            .collect::<Result<_, _>>()?;

        if fc1_weight.shape().len() != 2 || fc1_weight.shape()[1] != channels {
            return Err(ClassifyError::Inference(format!(
                "Hidden layer expects {:?} inputs, pooling produces {}",
                fc1_weight.shape(), channels
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
            entry_weight,
            entry_bias,
            blocks,
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

    /// Forward pass through the entry convolution and separable blocks
    fn features(&self, input: &Tensor) -> Result<Tensor, ClassifyError> {
        let mut x = self.backend.conv2d(input, &self.entry_weight, Some(&self.entry_bias), 2, 1)?;
        self.backend.relu(&mut x);

        for block in &self.blocks {
            let spatial = self.backend.depthwise_conv2d(&x, &block.depthwise, 1, 1)?;
            x = self.backend.conv2d(&spatial, &block.pointwise, Some(&block.bias), 1, 0)?;
            self.backend.relu(&mut x);
            if block.pool {
                x = self.backend.max_pool2d(&x, 2, 2)?;
            }
        }

        Ok(x)
    }

    /// Head forward pass from the feature map: returns logits, the hidden
    /// pre-activation, and the pooling argmax indices for gradient routing.
    fn head(&self, features: &Tensor) -> Result<(Tensor, Tensor, Vec<usize>), ClassifyError> {
        let (pooled, indices) = self.backend.global_max_pool(features)?;
        let pre_hidden = self.backend.linear(&pooled, &self.fc1_weight, Some(&self.fc1_bias))?;
        let mut hidden = pre_hidden.clone();
        self.backend.relu(&mut hidden);
        let logits = self.backend.linear(&hidden, &self.fc2_weight, Some(&self.fc2_bias))?;
        Ok((logits, pre_hidden, indices))
    }
}

impl ModelHandle for XceptionTransfer {
    fn kind(&self) -> ModelKind {
        ModelKind::XceptionTransfer
    }

    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn normalization(&self) -> NormalizationPolicy {
        NormalizationPolicy::SymmetricUnit
    }

    fn predict(&self, scan: &ScanImage) -> Result<ProbabilityVector, ClassifyError> {
        self.check_scan(scan)?;
        let features = self.features(scan.tensor())?;
        let (mut logits, _, _) = self.head(&features)?;
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
        let (_, pre_hidden, indices) = self.head(&features)?;

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

        // Back through the hidden layer to the pooled vector, then route
        // each channel's gradient to the spatial position that won the max
        let grad_pooled = self.backend.linear_grad_input(&self.fc1_weight, &grad_hidden)?;

        let shape = features.shape();
        let (channels, plane) = (shape[0], shape[1] * shape[2]);
        let mut gradients = Tensor::zeros(shape.to_vec());
        for ch in 0..channels {
            gradients.data_mut()[ch * plane + indices[ch]] = grad_pooled.data()[ch];
        }

        Ok(ActivationGradients { activations: features, gradients })
    }
}
