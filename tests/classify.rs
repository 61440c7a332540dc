use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, RgbImage};

use neuroscan::vision::backend::create_backend;
use neuroscan::vision::engine::{EngineOptions, InferenceEngine};
use neuroscan::vision::error::ClassifyError;
use neuroscan::vision::labels::CLASS_COUNT;
use neuroscan::vision::models::{CustomCnn, ModelHandle, XceptionTransfer};
use neuroscan::vision::normalize::InputShape;
use neuroscan::vision::registry::ModelRegistry;
use neuroscan::vision::tensor::Tensor;

/// Deterministic weight pattern; different periods give different layers
/// asymmetric, non-trivial parameters.
fn pattern(len: usize, period: usize, scale: f32) -> Vec<f32> {
    (0..len)
        .map(|i| ((i % period) as f32 - period as f32 / 2.0) * scale)
        .collect()
}

/// A small two-stage custom CNN over 16x16 inputs.
fn tiny_custom_cnn() -> CustomCnn {
    let backend = create_backend();

    let blocks = vec![
        (
            Tensor::new(pattern(2 * 3 * 9, 7, 0.1), vec![2, 3, 3, 3]).unwrap(),
            Tensor::new(vec![0.05, -0.05], vec![2]).unwrap(),
        ),
        (
            Tensor::new(pattern(2 * 2 * 9, 5, 0.12), vec![2, 2, 3, 3]).unwrap(),
            Tensor::new(vec![0.1, 0.0], vec![2]).unwrap(),
        ),
    ];

    // Two pooling stages shrink 16x16 to 4x4, so 2*4*4 = 32 flat features
    CustomCnn::from_parts(
        backend,
        InputShape::square_rgb(16),
        blocks,
        Tensor::new(pattern(6 * 32, 9, 0.05), vec![6, 32]).unwrap(),
        Tensor::new(vec![0.01; 6], vec![6]).unwrap(),
        Tensor::new(pattern(4 * 6, 11, 0.07), vec![4, 6]).unwrap(),
        Tensor::new(vec![0.0, 0.05, -0.05, 0.02], vec![4]).unwrap(),
    )
    .unwrap()
}

/// A small separable-convolution network over 16x16 inputs.
fn tiny_xception() -> XceptionTransfer {
    let backend = create_backend();

    let blocks = vec![
        (
            Tensor::new(pattern(4 * 9, 5, 0.1), vec![4, 3, 3]).unwrap(),
            Tensor::new(pattern(6 * 4, 7, 0.12), vec![6, 4, 1, 1]).unwrap(),
            Tensor::new(vec![0.01; 6], vec![6]).unwrap(),
        ),
        (
            Tensor::new(pattern(6 * 9, 4, 0.09), vec![6, 3, 3]).unwrap(),
            Tensor::new(pattern(5 * 6, 8, 0.11), vec![5, 6, 1, 1]).unwrap(),
            Tensor::new(vec![-0.01; 5], vec![5]).unwrap(),
        ),
    ];

    XceptionTransfer::from_parts(
        backend,
        InputShape::square_rgb(16),
        Tensor::new(pattern(4 * 3 * 9, 6, 0.08), vec![4, 3, 3, 3]).unwrap(),
        Tensor::new(vec![0.02; 4], vec![4]).unwrap(),
        blocks,
        Tensor::new(pattern(7 * 5, 9, 0.06), vec![7, 5]).unwrap(),
        Tensor::new(vec![0.015; 7], vec![7]).unwrap(),
        Tensor::new(pattern(4 * 7, 10, 0.05), vec![4, 7]).unwrap(),
        Tensor::new(vec![0.0, 0.03, -0.03, 0.01], vec![4]).unwrap(),
    )
    .unwrap()
}

fn test_engine() -> InferenceEngine {
    let registry = ModelRegistry::from_handles(vec![
        Arc::new(tiny_custom_cnn()) as Arc<dyn ModelHandle>,
        Arc::new(tiny_xception()) as Arc<dyn ModelHandle>,
    ]);
    InferenceEngine::new(Arc::new(registry), EngineOptions::default())
}

fn png_bytes(width: u32, height: u32, value: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb([value, value, value]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

#[test]
fn all_black_scan_yields_valid_result() {
    let engine = test_engine();
    let result = engine.classify(&png_bytes(64, 64, 0), "custom-cnn").unwrap();

    // A full simplex over the four classes
    let values = result.probabilities().values();
    assert_eq!(values.len(), CLASS_COUNT);
    assert!(values.iter().all(|v| *v >= 0.0));
    let sum: f32 = values.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);

    // Not exactly uniform: the model has asymmetric parameters
    assert!(values.iter().any(|v| (v - 0.25).abs() > 1e-6));

    // Predicted label is the distribution argmax
    assert_eq!(result.predicted_label(), result.probabilities().argmax());
}

#[test]
fn overlay_matches_normalized_scan_dimensions() {
    let engine = test_engine();
    let result = engine.classify(&png_bytes(200, 120, 60), "custom-cnn").unwrap();

    // The overlay decodes back to the model's input resolution
    let decoded = image::load_from_memory(&result.overlay_png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 16));
}

#[test]
fn classify_is_deterministic() {
    let engine = test_engine();
    let bytes = png_bytes(48, 48, 33);

    let a = engine.classify(&bytes, "custom-cnn").unwrap();
    let b = engine.classify(&bytes, "custom-cnn").unwrap();

    assert_eq!(a.probabilities().values(), b.probabilities().values());
    // Overlay bytes match too: no non-determinism anywhere in the pipeline
    assert_eq!(a.overlay_png, b.overlay_png);
}

#[test]
fn unrecognized_model_id_is_rejected_without_fallback() {
    let engine = test_engine();
    let result = engine.classify(&png_bytes(32, 32, 10), "resnet50");
    assert!(matches!(result, Err(ClassifyError::UnknownModel(_))));
}

#[test]
fn empty_and_malformed_input_yield_decode_errors() {
    let engine = test_engine();

    let result = engine.classify(&[], "custom-cnn");
    assert!(matches!(result, Err(ClassifyError::Decode(_))));

    let result = engine.classify(b"not an image at all", "custom-cnn");
    assert!(matches!(result, Err(ClassifyError::Decode(_))));
}

#[test]
fn both_variants_run_the_same_pipeline() {
    let engine = test_engine();
    let bytes = png_bytes(64, 64, 128);

    for model_id in ["custom-cnn", "xception"] {
        let result = engine.classify(&bytes, model_id).unwrap();
        let sum: f32 = result.probabilities().values().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "{} distribution not normalized", model_id);
        assert!(!result.overlay_png.is_empty());
    }
}
