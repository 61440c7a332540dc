use std::fmt;
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use super::super::Backend;
use crate::vision::error::ClassifyError;
use crate::vision::tensor::Tensor;

/// CPU backend implementation using ndarray
#[derive(Clone)]
pub struct CpuBackend {
    // Configuration options could go here
}

impl CpuBackend {
    /// Create a new CPU backend instance.
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuBackend").finish()
    }
}

/// Checks a tensor has the expected rank, returning its dimensions.
fn expect_rank<'a>(tensor: &'a Tensor, rank: usize, what: &str) -> Result<&'a [usize], ClassifyError> {
    if tensor.shape().len() != rank {
        return Err(ClassifyError::Inference(format!(
            "{} must have rank {}, got shape {:?}",
            what, rank, tensor.shape()
        )));
    }
    Ok(tensor.shape())
}

/// Output spatial size of a strided, padded filter sweep.
fn conv_output_dim(input: usize, kernel: usize, stride: usize, padding: usize) -> Result<usize, ClassifyError> {
    let padded = input + 2 * padding;
    if kernel > padded || stride == 0 {
        return Err(ClassifyError::Inference(format!(
            "Kernel {} with stride {} does not fit input extent {} (padding {})",
            kernel, stride, input, padding
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

impl Backend for CpuBackend {
    /// im2col convolution: unrolls input patches into a column matrix and
    /// reduces the convolution to one matrix product.
    fn conv2d(
        &self,
        input: &Tensor,
        weight: &Tensor,
        bias: Option<&Tensor>,
        stride: usize,
        padding: usize,
    ) -> Result<Tensor, ClassifyError> {
        let in_shape = expect_rank(input, 3, "conv2d input")?;
        let w_shape = expect_rank(weight, 4, "conv2d weight")?;
        let (c, h, w) = (in_shape[0], in_shape[1], in_shape[2]);
        let (out_c, kc, kh, kw) = (w_shape[0], w_shape[1], w_shape[2], w_shape[3]);

        if kc != c {
            return Err(ClassifyError::Inference(format!(
                "conv2d channel mismatch: input has {}, filter expects {}",
                c, kc
            )));
        }
        if let Some(b) = bias {
            if b.shape() != [out_c] {
                return Err(ClassifyError::Inference(format!(
                    "conv2d bias shape {:?} does not match {} output channels",
                    b.shape(), out_c
                )));
            }
        }

        let out_h = conv_output_dim(h, kh, stride, padding)?;
        let out_w = conv_output_dim(w, kw, stride, padding)?;

        // Column matrix: one row per (channel, ky, kx) filter tap, one
        // column per output pixel. Rows are filled independently.
        let col_rows = c * kh * kw;
        let col_cols = out_h * out_w;
        let mut col = vec![0.0f32; col_rows * col_cols];
        let input_data = input.data();

        col.par_chunks_mut(col_cols)
            .enumerate()
            .for_each(|(row, out_row)| {
                let ch = row / (kh * kw);
                let tap = row % (kh * kw);
                let (ky, kx) = (tap / kw, tap % kw);
                let plane = &input_data[ch * h * w..(ch + 1) * h * w];

                for oy in 0..out_h {
                    let iy = (oy * stride + ky) as isize - padding as isize;
                    for ox in 0..out_w {
                        let ix = (ox * stride + kx) as isize - padding as isize;
                        let value = if iy >= 0 && iy < h as isize && ix >= 0 && ix < w as isize {
                            plane[iy as usize * w + ix as usize]
                        } else {
                            0.0
                        };
                        out_row[oy * out_w + ox] = value;
                    }
                }
            });

        // Reduce to a single matrix product (BLAS-backed when available)
        let w_mat = Array2::from_shape_vec((out_c, col_rows), weight.data().to_vec())
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        let col_mat = Array2::from_shape_vec((col_rows, col_cols), col)
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        let mut out = w_mat.dot(&col_mat);

        if let Some(b) = bias {
            for (i, mut row) in out.outer_iter_mut().enumerate() {
                row += b.data()[i];
            }
        }

        Tensor::new(out.iter().copied().collect(), vec![out_c, out_h, out_w])
    }

    /// Direct depthwise convolution, channels processed in parallel.
    fn depthwise_conv2d(
        &self,
        input: &Tensor,
        weight: &Tensor,
        stride: usize,
        padding: usize,
    ) -> Result<Tensor, ClassifyError> {
        let in_shape = expect_rank(input, 3, "depthwise input")?;
        let w_shape = expect_rank(weight, 3, "depthwise weight")?;
        let (c, h, w) = (in_shape[0], in_shape[1], in_shape[2]);
        let (kc, kh, kw) = (w_shape[0], w_shape[1], w_shape[2]);

        if kc != c {
            return Err(ClassifyError::Inference(format!(
                "depthwise channel mismatch: input has {}, filter expects {}",
                c, kc
            )));
        }

        let out_h = conv_output_dim(h, kh, stride, padding)?;
        let out_w = conv_output_dim(w, kw, stride, padding)?;

        let input_data = input.data();
        let weight_data = weight.data();
        let mut out = vec![0.0f32; c * out_h * out_w];

        out.par_chunks_mut(out_h * out_w)
            .enumerate()
            .for_each(|(ch, out_plane)| {
                let plane = &input_data[ch * h * w..(ch + 1) * h * w];
                let kernel = &weight_data[ch * kh * kw..(ch + 1) * kh * kw];

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let mut acc = 0.0f32;
                        for ky in 0..kh {
                            let iy = (oy * stride + ky) as isize - padding as isize;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            for kx in 0..kw {
                                let ix = (ox * stride + kx) as isize - padding as isize;
                                if ix < 0 || ix >= w as isize {
                                    continue;
                                }
                                acc += plane[iy as usize * w + ix as usize] * kernel[ky * kw + kx];
                            }
                        }
                        out_plane[oy * out_w + ox] = acc;
                    }
                }
            });

        Tensor::new(out, vec![c, out_h, out_w])
    }

    fn max_pool2d(
        &self,
        input: &Tensor,
        kernel: usize,
        stride: usize,
    ) -> Result<Tensor, ClassifyError> {
        let in_shape = expect_rank(input, 3, "max_pool2d input")?;
        let (c, h, w) = (in_shape[0], in_shape[1], in_shape[2]);

        let out_h = conv_output_dim(h, kernel, stride, 0)?;
        let out_w = conv_output_dim(w, kernel, stride, 0)?;

        let input_data = input.data();
        let mut out = vec![0.0f32; c * out_h * out_w];

        for ch in 0..c {
            let plane = &input_data[ch * h * w..(ch + 1) * h * w];
            let out_plane = &mut out[ch * out_h * out_w..(ch + 1) * out_h * out_w];
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut best = f32::NEG_INFINITY;
                    for ky in 0..kernel {
                        for kx in 0..kernel {
                            let v = plane[(oy * stride + ky) * w + (ox * stride + kx)];
                            if v > best {
                                best = v;
                            }
                        }
                    }
                    out_plane[oy * out_w + ox] = best;
                }
            }
        }

        Tensor::new(out, vec![c, out_h, out_w])
    }

    fn global_max_pool(&self, input: &Tensor) -> Result<(Tensor, Vec<usize>), ClassifyError> {
        let in_shape = expect_rank(input, 3, "global_max_pool input")?;
        let (c, h, w) = (in_shape[0], in_shape[1], in_shape[2]);
        let plane_size = h * w;

        let input_data = input.data();
        let mut pooled = Vec::with_capacity(c);
        let mut indices = Vec::with_capacity(c);

        for ch in 0..c {
            let plane = &input_data[ch * plane_size..(ch + 1) * plane_size];
            let mut best = 0;
            for (i, v) in plane.iter().enumerate() {
                if *v > plane[best] {
                    best = i;
                }
            }
            pooled.push(plane[best]);
            indices.push(best);
        }

        Ok((Tensor::new(pooled, vec![c])?, indices))
    }

    fn linear(
        &self,
        input: &Tensor,
        weight: &Tensor,
        bias: Option<&Tensor>,
    ) -> Result<Tensor, ClassifyError> {
        let in_shape = expect_rank(input, 1, "linear input")?;
        let w_shape = expect_rank(weight, 2, "linear weight")?;
        let (out_f, in_f) = (w_shape[0], w_shape[1]);

        if in_shape[0] != in_f {
            return Err(ClassifyError::Inference(format!(
                "linear shape mismatch: input has {} features, weight expects {}",
                in_shape[0], in_f
            )));
        }

        let w_mat = Array2::from_shape_vec((out_f, in_f), weight.data().to_vec())
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        let x = Array1::from_vec(input.data().to_vec());

        let mut y = w_mat.dot(&x);
        if let Some(b) = bias {
            if b.shape() != [out_f] {
                return Err(ClassifyError::Inference(format!(
                    "linear bias shape {:?} does not match {} output features",
                    b.shape(), out_f
                )));
            }
            y += &Array1::from_vec(b.data().to_vec());
        }

        Tensor::new(y.to_vec(), vec![out_f])
    }

    fn linear_grad_input(
        &self,
        weight: &Tensor,
        grad_output: &Tensor,
    ) -> Result<Tensor, ClassifyError> {
        let w_shape = expect_rank(weight, 2, "linear weight")?;
        let g_shape = expect_rank(grad_output, 1, "linear output gradient")?;
        let (out_f, in_f) = (w_shape[0], w_shape[1]);

        if g_shape[0] != out_f {
            return Err(ClassifyError::Inference(format!(
                "gradient shape mismatch: gradient has {} features, weight produces {}",
                g_shape[0], out_f
            )));
        }

        let w_mat = Array2::from_shape_vec((out_f, in_f), weight.data().to_vec())
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        let g = Array1::from_vec(grad_output.data().to_vec());

        let dx = w_mat.t().dot(&g);
        Tensor::new(dx.to_vec(), vec![in_f])
    }

    fn relu(&self, tensor: &mut Tensor) {
        for v in tensor.data_mut() {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
    }

    fn softmax(&self, tensor: &mut Tensor) -> Result<(), ClassifyError> {
        expect_rank(tensor, 1, "softmax input")?;

        if tensor.has_non_finite() {
            return Err(ClassifyError::Inference(
                "softmax input contains non-finite logits".to_string()
            ));
        }

        // Subtract the max before exponentiating for numerical stability
        let max = tensor.data().iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for v in tensor.data_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }

        if !sum.is_finite() || sum <= 0.0 {
            return Err(ClassifyError::Inference(format!(
                "softmax normalization degenerate (sum = {})", sum
            )));
        }

        for v in tensor.data_mut() {
            *v /= sum;
        }

        Ok(())
    }
}
