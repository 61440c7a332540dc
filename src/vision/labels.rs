use std::fmt;
use serde::Serialize;

use crate::vision::error::ClassifyError;

/// Number of recognized scan classes
pub const CLASS_COUNT: usize = 4;

/// Tolerance used when checking that probabilities sum to one
const SUM_TOLERANCE: f32 = 1e-5;

/// The fixed class enumeration for scan classification.
///
/// The discriminant order is the index order of every probability vector
/// produced by the models, and must match the label order the models were
/// trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    Glioma = 0,
    Meningioma = 1,
    NoTumor = 2,
    Pituitary = 3,
}

impl ClassLabel {
    /// All labels in index order
    pub fn all() -> [ClassLabel; CLASS_COUNT] {
        [
            ClassLabel::Glioma,
            ClassLabel::Meningioma,
            ClassLabel::NoTumor,
            ClassLabel::Pituitary,
        ]
    }

    /// The label at a given probability index
    pub fn from_index(index: usize) -> Option<ClassLabel> {
        Self::all().get(index).copied()
    }

    /// The wire/serialized name of the label
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::Glioma => "glioma",
            ClassLabel::Meningioma => "meningioma",
            ClassLabel::NoTumor => "no_tumor",
            ClassLabel::Pituitary => "pituitary",
        }
    }

    /// Human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            ClassLabel::Glioma => "Glioma",
            ClassLabel::Meningioma => "Meningioma",
            ClassLabel::NoTumor => "No tumor",
            ClassLabel::Pituitary => "Pituitary",
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ordered distribution over the four scan classes.
///
/// Construction validates the simplex invariant: exactly four entries, all
/// non-negative and finite, summing to one within tolerance. Instances are
/// immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector {
    values: [f32; CLASS_COUNT],
}

impl ProbabilityVector {
    /// Builds a probability vector, enforcing the simplex invariant.
    ///
    /// # Arguments
    ///
    /// * `values` - Class probabilities in `ClassLabel` index order
    pub fn new(values: Vec<f32>) -> Result<Self, ClassifyError> {
        if values.len() != CLASS_COUNT {
            return Err(ClassifyError::InvariantViolation(format!(
                "Probability vector has {} entries, expected {}",
                values.len(),
                CLASS_COUNT
            )));
        }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ClassifyError::InvariantViolation(format!(
                "Probability vector contains negative or non-finite entries: {:?}",
                values
            )));
        }
        let sum: f32 = values.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(ClassifyError::InvariantViolation(format!(
                "Probability vector sums to {}, expected 1.0",
                sum
            )));
        }

        let mut array = [0.0; CLASS_COUNT];
        array.copy_from_slice(&values);
        Ok(Self { values: array })
    }

    /// The probability assigned to a label
    pub fn get(&self, label: ClassLabel) -> f32 {
        self.values[label as usize]
    }

    /// All probabilities in label index order
    pub fn values(&self) -> &[f32; CLASS_COUNT] {
        &self.values
    }

    /// The label with the highest probability.
    ///
    /// Ties resolve to the lowest index, which keeps the result
    /// deterministic for identical inputs.
    pub fn argmax(&self) -> ClassLabel {
        let mut best = 0;
        for (i, v) in self.values.iter().enumerate() {
            if *v > self.values[best] {
                best = i;
            }
        }
        // CLASS_COUNT entries always map to a label
        ClassLabel::from_index(best).expect("argmax index within label range")
    }

    /// The confidence of the predicted class
    pub fn confidence(&self) -> f32 {
        self.get(self.argmax())
    }

    /// (label, probability) pairs in label index order
    pub fn iter(&self) -> impl Iterator<Item = (ClassLabel, f32)> + '_ {
        ClassLabel::all().into_iter().map(|l| (l, self.get(l)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order_matches_training_order() {
        // Index order is the order the models emit probabilities in
        assert_eq!(ClassLabel::from_index(0), Some(ClassLabel::Glioma));
        assert_eq!(ClassLabel::from_index(1), Some(ClassLabel::Meningioma));
        assert_eq!(ClassLabel::from_index(2), Some(ClassLabel::NoTumor));
        assert_eq!(ClassLabel::from_index(3), Some(ClassLabel::Pituitary));
        assert_eq!(ClassLabel::from_index(4), None);
    }

    #[test]
    fn test_simplex_invariant_enforced() {
        assert!(ProbabilityVector::new(vec![0.25; 4]).is_ok());
        // Wrong arity
        assert!(ProbabilityVector::new(vec![0.5, 0.5]).is_err());
        // Negative entry
        assert!(ProbabilityVector::new(vec![-0.1, 0.5, 0.3, 0.3]).is_err());
        // Does not sum to one
        assert!(ProbabilityVector::new(vec![0.5, 0.5, 0.5, 0.5]).is_err());
        // NaN entry
        assert!(ProbabilityVector::new(vec![f32::NAN, 0.5, 0.25, 0.25]).is_err());
    }

    #[test]
    fn test_argmax_and_confidence() {
        let pv = ProbabilityVector::new(vec![0.1, 0.2, 0.6, 0.1]).unwrap();
        assert_eq!(pv.argmax(), ClassLabel::NoTumor);
        assert!((pv.confidence() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_wire_names() {
        let names: Vec<&str> = ClassLabel::all().iter().map(|l| l.as_str()).collect();
        assert_eq!(names, vec!["glioma", "meningioma", "no_tumor", "pituitary"]);
    }
}
