use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::vision::error::ClassifyError;
use crate::vision::labels::{ClassLabel, ProbabilityVector, CLASS_COUNT};

// Probabilities serialize as an ordered label -> value map, in class
// index order, for callers and the downstream explanation generator.
impl Serialize for ProbabilityVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CLASS_COUNT))?;
        for (label, p) in self.iter() {
            map.serialize_entry(label.as_str(), &p)?;
        }
        map.end()
    }
}

/// The numeric evidence record: what was predicted and with what
/// distribution. This is the structured record handed to the
/// (out-of-scope) explanation generator, with no additional protocol.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub predicted_label: ClassLabel,
    pub probabilities: ProbabilityVector,
}

/// The unit of pipeline output: prediction plus the encoded overlay.
///
/// Owned by the caller after assembly; nothing mutates it afterwards.
pub struct ClassificationResult {
    /// Identifier correlating this result with request logs
    pub request_id: String,
    /// Predicted label and class distribution
    pub prediction: Prediction,
    /// PNG-encoded saliency overlay at the normalized scan's resolution
    pub overlay_png: Vec<u8>,
}

impl ClassificationResult {
    pub fn predicted_label(&self) -> ClassLabel {
        self.prediction.predicted_label
    }

    pub fn probabilities(&self) -> &ProbabilityVector {
        &self.prediction.probabilities
    }
}

/// Packages the pipeline outputs, re-asserting the invariants upstream
/// components already guarantee. A failure here is an internal bug, never
/// a user-input problem.
pub fn assemble(
    request_id: String,
    predicted_label: ClassLabel,
    probabilities: ProbabilityVector,
    overlay_png: Vec<u8>,
) -> Result<ClassificationResult, ClassifyError> {
    if probabilities.argmax() != predicted_label {
        return Err(ClassifyError::InvariantViolation(format!(
            "Predicted label {} is not the distribution argmax {}",
            predicted_label,
            probabilities.argmax()
        )));
    }
    if overlay_png.is_empty() {
        return Err(ClassifyError::InvariantViolation(
            "Overlay image is empty".to_string(),
        ));
    }

    Ok(ClassificationResult {
        request_id,
        prediction: Prediction { predicted_label, probabilities },
        overlay_png,
    })
}
