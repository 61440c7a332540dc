use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::ModelsConfig;
use crate::vision::error::ClassifyError;
use crate::vision::backend::create_backend;
use crate::vision::labels::ClassLabel;
use crate::vision::models::{CustomCnn, ModelHandle, ModelKind, XceptionTransfer};
use crate::vision::registry::types::ModelEntry;
use crate::weights::{is_weights_file, WeightsReader};

/// The process-wide table of loaded classifiers.
///
/// Built once at startup from configuration, read-only afterwards, and
/// shared across request handlers by reference. Concurrent resolution
/// needs no locking because nothing mutates the table after construction.
pub struct ModelRegistry {
    /// Loaded handles keyed by their recognized kind
    models: HashMap<ModelKind, Arc<dyn ModelHandle>>,
    /// Presentation metadata for listings
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    /// Loads every configured model from its weight container.
    ///
    /// A configured model that is missing, malformed, or disagrees with
    /// its declared architecture fails startup; a partially loaded
    /// registry is a configuration defect, not a serving state.
    ///
    /// # Arguments
    ///
    /// * `config` - The `[models]` section of the settings
    pub fn from_config(config: &ModelsConfig) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let backend = create_backend();

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{prefix:.bold.dim} {spinner} {wide_msg}")
                .unwrap()
        );
        pb.enable_steady_tick(Duration::from_millis(120));

        let mut models: HashMap<ModelKind, Arc<dyn ModelHandle>> = HashMap::new();
        let mut entries = Vec::new();

        for entry in &config.entry {
            pb.set_message(format!("Loading model '{}' from {}...", entry.id, entry.file));

            // The identifier set is closed; configuration cannot extend it
            let kind = ModelKind::from_id(&entry.id).ok_or_else(|| {
                format!(
                    "Unrecognized model id '{}' in configuration (expected one of: xception, custom-cnn)",
                    entry.id
                )
            })?;
            if models.contains_key(&kind) {
                return Err(format!("Model id '{}' configured more than once", entry.id).into());
            }

            let path = config.directory.join(&entry.file);
            if !is_weights_file(&path) {
                return Err(format!(
                    "Model file {} is missing or not a weight container",
                    path.display()
                ).into());
            }

            let reader = WeightsReader::open(&path)?;
            check_container_agreement(&reader, kind)?;

            let handle: Arc<dyn ModelHandle> = match kind {
                ModelKind::CustomCnn => {
                    Arc::new(CustomCnn::from_container(&reader, Arc::clone(&backend))?)
                }
                ModelKind::XceptionTransfer => {
                    Arc::new(XceptionTransfer::from_container(&reader, Arc::clone(&backend))?)
                }
            };

            entries.push(ModelEntry {
                id: kind.id().to_string(),
                name: kind.display_name().to_string(),
                architecture: kind.id().to_string(),
                filename: entry.file.clone(),
                input_size: handle.input_shape().height as u32,
                normalization: handle.normalization().name().to_string(),
                tensor_count: reader.tensors.len() as u64,
                loaded_at: reader.loaded_at,
            });
            models.insert(kind, handle);

            info!("Loaded model '{}' from {}", entry.id, path.display());
        }

        pb.finish_with_message(format!("Loaded {} model(s)", models.len()));

        Ok(Self { models, entries })
    }

    /// Builds a registry directly from handles.
    ///
    /// This is the injection seam the tests use: mock or synthetic handles
    /// go through exactly the same resolution path as container-loaded
    /// ones.
    pub fn from_handles(handles: Vec<Arc<dyn ModelHandle>>) -> Self {
        let mut models = HashMap::new();
        let mut entries = Vec::new();

        for handle in handles {
            let kind = handle.kind();
            entries.push(ModelEntry {
                id: kind.id().to_string(),
                name: kind.display_name().to_string(),
                architecture: kind.id().to_string(),
                filename: String::new(),
                input_size: handle.input_shape().height as u32,
                normalization: handle.normalization().name().to_string(),
                tensor_count: 0,
                loaded_at: Utc::now(),
            });
            models.insert(kind, handle);
        }

        Self { models, entries }
    }

    /// Resolves a request-supplied identifier to a loaded handle.
    ///
    /// O(1) against the startup-built table. Fails with
    /// `ClassifyError::UnknownModel` for identifiers outside the
    /// recognized set and for recognized identifiers with no loaded model.
    pub fn resolve(&self, model_id: &str) -> Result<Arc<dyn ModelHandle>, ClassifyError> {
        let kind = ModelKind::from_id(model_id)
            .ok_or_else(|| ClassifyError::UnknownModel(model_id.to_string()))?;

        self.models
            .get(&kind)
            .cloned()
            .ok_or_else(|| ClassifyError::UnknownModel(format!("{} (no model loaded)", model_id)))
    }

    /// Presentation metadata for every loaded model
    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Number of loaded models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Verifies a container's declared metadata matches the compiled-in
/// expectations for the model kind it is configured as.
fn check_container_agreement(
    reader: &WeightsReader,
    kind: ModelKind,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let architecture = reader.metadata_value("general.architecture")?;
    if architecture != kind.id() {
        return Err(format!(
            "Container {} declares architecture '{}' but is configured as '{}'",
            reader.path.display(), architecture, kind.id()
        ).into());
    }

    let declared_labels = reader.metadata_value("vision.class_labels")?;
    let expected: Vec<&str> = ClassLabel::all().iter().map(|l| l.as_str()).collect();
    if declared_labels != expected.join(",") {
        return Err(format!(
            "Container {} declares class labels '{}', expected '{}'",
            reader.path.display(), declared_labels, expected.join(",")
        ).into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::labels::ProbabilityVector;
    use crate::vision::models::ActivationGradients;
    use crate::vision::normalize::{InputShape, NormalizationPolicy, ScanImage};

    struct StubHandle(ModelKind);

    impl ModelHandle for StubHandle {
        fn kind(&self) -> ModelKind {
            self.0
        }

        fn input_shape(&self) -> InputShape {
            InputShape::square_rgb(16)
        }

        fn normalization(&self) -> NormalizationPolicy {
            NormalizationPolicy::ZeroToOne
        }

        fn predict(&self, _scan: &ScanImage) -> Result<ProbabilityVector, ClassifyError> {
            ProbabilityVector::new(vec![0.25; 4])
        }

        fn activation_gradients(
            &self,
            _scan: &ScanImage,
            _class_index: usize,
        ) -> Result<ActivationGradients, ClassifyError> {
            Err(ClassifyError::SaliencyUnavailable("stub".to_string()))
        }
    }

    #[test]
    fn test_resolve_known_and_unknown_ids() {
        let registry = ModelRegistry::from_handles(vec![
            Arc::new(StubHandle(ModelKind::CustomCnn)),
        ]);

        assert!(registry.resolve("custom-cnn").is_ok());

        // Outside the recognized identifier set: no fallback model
        let result = registry.resolve("resnet50");
        assert!(matches!(result, Err(ClassifyError::UnknownModel(_))));

        // Recognized but not loaded
        let result = registry.resolve("xception");
        assert!(matches!(result, Err(ClassifyError::UnknownModel(_))));
    }

    #[test]
    fn test_entries_reflect_loaded_handles() {
        let registry = ModelRegistry::from_handles(vec![
            Arc::new(StubHandle(ModelKind::CustomCnn)),
            Arc::new(StubHandle(ModelKind::XceptionTransfer)),
        ]);

        assert_eq!(registry.len(), 2);
        let ids: Vec<&str> = registry.entries().iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&"custom-cnn") && ids.contains(&"xception"));
    }
}
