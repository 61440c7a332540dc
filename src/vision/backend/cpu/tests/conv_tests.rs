use crate::vision::backend::{Backend, cpu::CpuBackend};
use crate::vision::tensor::Tensor;

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-5, "expected {:?}, got {:?}", expected, actual);
    }
}

#[test]
fn test_conv2d_identity_kernel() {
    let backend = CpuBackend::new();
    let input = Tensor::new((1..=9).map(|v| v as f32).collect(), vec![1, 3, 3]).unwrap();
    // A single 1x1 filter with weight 1 reproduces the input
    let weight = Tensor::new(vec![1.0], vec![1, 1, 1, 1]).unwrap();

    let out = backend.conv2d(&input, &weight, None, 1, 0).unwrap();
    assert_eq!(out.shape(), &[1, 3, 3]);
    assert_close(out.data(), input.data());
}

#[test]
fn test_conv2d_box_filter_with_padding() {
    let backend = CpuBackend::new();
    let input = Tensor::new((1..=9).map(|v| v as f32).collect(), vec![1, 3, 3]).unwrap();
    let weight = Tensor::new(vec![1.0; 9], vec![1, 1, 3, 3]).unwrap();

    // Without padding the 3x3 box filter collapses to the full sum
    let out = backend.conv2d(&input, &weight, None, 1, 0).unwrap();
    assert_eq!(out.shape(), &[1, 1, 1]);
    assert_close(out.data(), &[45.0]);

    // With padding 1 the output keeps the input extent; the top-left value
    // only sees the in-bounds 2x2 neighborhood
    let out = backend.conv2d(&input, &weight, None, 1, 1).unwrap();
    assert_eq!(out.shape(), &[1, 3, 3]);
    assert!((out.data()[0] - 12.0).abs() < 1e-5);
    assert!((out.data()[4] - 45.0).abs() < 1e-5);
}

#[test]
fn test_conv2d_bias_and_multiple_filters() {
    let backend = CpuBackend::new();
    let input = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![1, 2, 2]).unwrap();
    // Two 1x1 filters: scale by 1 and by 10
    let weight = Tensor::new(vec![1.0, 10.0], vec![2, 1, 1, 1]).unwrap();
    let bias = Tensor::new(vec![0.5, -1.0], vec![2]).unwrap();

    let out = backend.conv2d(&input, &weight, Some(&bias), 1, 0).unwrap();
    assert_eq!(out.shape(), &[2, 2, 2]);
    assert_close(out.data(), &[1.5, 2.5, 3.5, 4.5, 9.0, 19.0, 29.0, 39.0]);
}

#[test]
fn test_conv2d_stride() {
    let backend = CpuBackend::new();
    let input = Tensor::new((1..=16).map(|v| v as f32).collect(), vec![1, 4, 4]).unwrap();
    let weight = Tensor::new(vec![1.0], vec![1, 1, 1, 1]).unwrap();

    let out = backend.conv2d(&input, &weight, None, 2, 0).unwrap();
    assert_eq!(out.shape(), &[1, 2, 2]);
    assert_close(out.data(), &[1.0, 3.0, 9.0, 11.0]);
}

#[test]
fn test_conv2d_rejects_channel_mismatch() {
    let backend = CpuBackend::new();
    let input = Tensor::new(vec![0.0; 8], vec![2, 2, 2]).unwrap();
    let weight = Tensor::new(vec![0.0; 3], vec![1, 3, 1, 1]).unwrap();

    let result = backend.conv2d(&input, &weight, None, 1, 0);
    assert!(result.is_err());
    if let Err(e) = result {
        assert!(e.to_string().contains("channel mismatch"));
    }
}

#[test]
fn test_depthwise_conv2d_filters_channels_independently() {
    let backend = CpuBackend::new();
    // Two channels; each gets its own 1x1 scale
    let input = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], vec![2, 2, 2]).unwrap();
    let weight = Tensor::new(vec![2.0, -1.0], vec![2, 1, 1]).unwrap();

    let out = backend.depthwise_conv2d(&input, &weight, 1, 0).unwrap();
    assert_eq!(out.shape(), &[2, 2, 2]);
    assert_close(out.data(), &[2.0, 4.0, 6.0, 8.0, -5.0, -6.0, -7.0, -8.0]);
}

#[test]
fn test_depthwise_conv2d_padding_zero_fills() {
    let backend = CpuBackend::new();
    let input = Tensor::new(vec![1.0, 1.0, 1.0, 1.0], vec![1, 2, 2]).unwrap();
    let weight = Tensor::new(vec![1.0; 9], vec![1, 3, 3]).unwrap();

    let out = backend.depthwise_conv2d(&input, &weight, 1, 1).unwrap();
    assert_eq!(out.shape(), &[1, 2, 2]);
    // Every output sees the full 2x2 input through the zero-padded window
    assert_close(out.data(), &[4.0, 4.0, 4.0, 4.0]);
}
