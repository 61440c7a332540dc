use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Settings;
use crate::vision::error::ClassifyError;
use crate::vision::normalize;
use crate::vision::overlay;
use crate::vision::registry::ModelRegistry;
use crate::vision::result::{self, ClassificationResult};
use crate::vision::saliency::{self, SaliencyOptions};

/// Per-engine tuning for the explanation stages.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Saliency post-processing parameters
    pub saliency: SaliencyOptions,
    /// Heat-map blend weight for the overlay
    pub overlay_alpha: f32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            saliency: SaliencyOptions::default(),
            overlay_alpha: 0.7,
        }
    }
}

impl From<&Settings> for EngineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            saliency: SaliencyOptions::from(&settings.saliency),
            overlay_alpha: settings.saliency.alpha,
        }
    }
}

/// The core inference engine that runs the classification pipeline.
///
/// The engine holds the read-only model registry and request-independent
/// tuning. Every classification is stateless and independent, so one
/// engine serves any number of concurrent requests without coordination.
pub struct InferenceEngine {
    /// Model registry holding the loaded classifier handles
    registry: Arc<ModelRegistry>,
    /// Explanation-stage tuning
    options: EngineOptions,
}

impl InferenceEngine {
    /// Creates a new inference engine with the specified registry.
    ///
    /// # Arguments
    ///
    /// * `registry` - Model registry to resolve identifiers against
    /// * `options` - Explanation-stage tuning
    pub fn new(registry: Arc<ModelRegistry>, options: EngineOptions) -> Self {
        Self { registry, options }
    }

    /// The registry this engine resolves models against
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Runs the full pipeline on one scan: normalize, infer, explain,
    /// composite, assemble.
    ///
    /// # Arguments
    ///
    /// * `raw` - Encoded image bytes as uploaded by the caller
    /// * `model_id` - Identifier of the classifier to use
    ///
    /// # Returns
    ///
    /// A Result containing the classification result, or a typed error
    /// describing which stage failed. Identical bytes and model id always
    /// produce identical probabilities and overlay bytes.
    pub fn classify(&self, raw: &[u8], model_id: &str) -> Result<ClassificationResult, ClassifyError> {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let handle = self.registry.resolve(model_id)?;

        let stage = Instant::now();
        let scan = normalize::normalize(raw, handle.input_shape(), handle.normalization())?;
        debug!(request_id = %request_id, stage = "normalize", elapsed = ?stage.elapsed(), "stage complete");

        let stage = Instant::now();
        let probabilities = handle.predict(&scan)?;
        let predicted = probabilities.argmax();
        debug!(request_id = %request_id, stage = "infer", elapsed = ?stage.elapsed(), "stage complete");

        let stage = Instant::now();
        let map = saliency::explain(handle.as_ref(), &scan, predicted as usize, &self.options.saliency)?;
        debug!(request_id = %request_id, stage = "saliency", elapsed = ?stage.elapsed(), "stage complete");

        let overlay_image = overlay::composite(&scan, &map, self.options.overlay_alpha)?;
        let overlay_png = overlay::encode_png(&overlay_image)?;

        let result = result::assemble(request_id.clone(), predicted, probabilities, overlay_png)?;

        info!(
            request_id = %request_id,
            model = model_id,
            predicted = %result.predicted_label(),
            confidence = result.probabilities().confidence(),
            elapsed = ?started.elapsed(),
            "classification complete"
        );

        Ok(result)
    }
}
