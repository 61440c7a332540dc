use crate::vision::backend::{Backend, cpu::CpuBackend};
use crate::vision::tensor::Tensor;

#[test]
fn test_linear_matches_hand_computation() {
    let backend = CpuBackend::new();
    let input = Tensor::new(vec![1.0, 2.0], vec![2]).unwrap();
    let weight = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]).unwrap();
    let bias = Tensor::new(vec![0.0, 0.5, -1.0], vec![3]).unwrap();

    let out = backend.linear(&input, &weight, Some(&bias)).unwrap();
    assert_eq!(out.shape(), &[3]);
    assert_eq!(out.data(), &[1.0, 2.5, 2.0]);
}

#[test]
fn test_linear_rejects_feature_mismatch() {
    let backend = CpuBackend::new();
    let input = Tensor::new(vec![1.0, 2.0, 3.0], vec![3]).unwrap();
    let weight = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]).unwrap();
    assert!(backend.linear(&input, &weight, None).is_err());
}

#[test]
fn test_linear_grad_input_is_weight_transpose_product() {
    let backend = CpuBackend::new();
    // W = [[1, 2], [3, 4], [5, 6]], dy = [1, 0, -1] => dx = W^T dy = [-4, -4]
    let weight = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![3, 2]).unwrap();
    let grad = Tensor::new(vec![1.0, 0.0, -1.0], vec![3]).unwrap();

    let dx = backend.linear_grad_input(&weight, &grad).unwrap();
    assert_eq!(dx.shape(), &[2]);
    assert_eq!(dx.data(), &[-4.0, -4.0]);
}

#[test]
fn test_relu_clamps_negatives() {
    let backend = CpuBackend::new();
    let mut t = Tensor::new(vec![-2.0, -0.5, 0.0, 0.5, 2.0], vec![5]).unwrap();
    backend.relu(&mut t);
    assert_eq!(t.data(), &[0.0, 0.0, 0.0, 0.5, 2.0]);
}

#[test]
fn test_softmax_produces_simplex() {
    let backend = CpuBackend::new();
    let mut t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![4]).unwrap();
    backend.softmax(&mut t).unwrap();

    let sum: f32 = t.data().iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
    assert!(t.data().iter().all(|v| *v > 0.0));
    // Order is preserved: larger logits get larger probabilities
    assert!(t.data()[3] > t.data()[2] && t.data()[2] > t.data()[1]);
}

#[test]
fn test_softmax_is_shift_invariant() {
    let backend = CpuBackend::new();
    let mut a = Tensor::new(vec![1.0, 2.0, 3.0], vec![3]).unwrap();
    let mut b = Tensor::new(vec![101.0, 102.0, 103.0], vec![3]).unwrap();
    backend.softmax(&mut a).unwrap();
    backend.softmax(&mut b).unwrap();

    for (x, y) in a.data().iter().zip(b.data()) {
        assert!((x - y).abs() < 1e-6);
    }
}

#[test]
fn test_softmax_rejects_non_finite_logits() {
    let backend = CpuBackend::new();
    let mut t = Tensor::new(vec![1.0, f32::NAN, 0.0], vec![3]).unwrap();

    let result = backend.softmax(&mut t);
    assert!(result.is_err());
    if let Err(e) = result {
        assert!(e.to_string().contains("non-finite"));
    }
}
