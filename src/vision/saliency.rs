use tracing::debug;

use crate::config::SaliencyConfig;
use crate::vision::error::ClassifyError;
use crate::vision::labels::CLASS_COUNT;
use crate::vision::models::ModelHandle;
use crate::vision::normalize::ScanImage;

/// Tunable post-processing applied after the raw class-activation map.
#[derive(Debug, Clone)]
pub struct SaliencyOptions {
    /// Percentile below which values are zeroed (0-100)
    pub threshold_percentile: f32,
    /// Radius of the Gaussian smoothing kernel in pixels
    pub blur_radius: usize,
    /// Margin subtracted from the circular brain-mask radius, in pixels
    pub mask_margin: u32,
    /// Whether to restrict the map to the circular brain area
    pub apply_mask: bool,
}

impl Default for SaliencyOptions {
    fn default() -> Self {
        Self {
            threshold_percentile: 80.0,
            blur_radius: 5,
            mask_margin: 10,
            apply_mask: true,
        }
    }
}

impl From<&SaliencyConfig> for SaliencyOptions {
    fn from(cfg: &SaliencyConfig) -> Self {
        Self {
            threshold_percentile: cfg.threshold_percentile,
            blur_radius: cfg.blur_radius,
            mask_margin: cfg.mask_margin,
            apply_mask: cfg.apply_mask,
        }
    }
}

/// A per-pixel importance map over a scan, values in [0, 1].
///
/// Always has the same spatial extent as the scan it explains. Immutable
/// once generated.
pub struct SaliencyMap {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl SaliencyMap {
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn value(&self, y: usize, x: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

/// Computes an importance map for `class_index` over the given scan.
///
/// Gradient-weighted activation mapping: each feature channel is weighted
/// by the spatial mean of the class-score gradient over that channel, the
/// weighted channels are summed, negative contributions are clamped away,
/// and the result is min-max normalized and bilinearly upsampled to the
/// scan's resolution. Post-processing then restricts the map to the
/// circular brain area, zeroes values below the configured percentile and
/// smooths the survivors.
///
/// Works uniformly over any `ModelHandle`; only the handle's
/// activation/gradient capability is used.
pub fn explain(
    handle: &dyn ModelHandle,
    scan: &ScanImage,
    class_index: usize,
    opts: &SaliencyOptions,
) -> Result<SaliencyMap, ClassifyError> {
    if class_index >= CLASS_COUNT {
        return Err(ClassifyError::InvariantViolation(format!(
            "Class index {} outside the {}-class enumeration",
            class_index, CLASS_COUNT
        )));
    }

    let ag = handle.activation_gradients(scan, class_index)?;
    if ag.activations.shape() != ag.gradients.shape() || ag.activations.shape().len() != 3 {
        return Err(ClassifyError::InvariantViolation(format!(
            "Activation shape {:?} and gradient shape {:?} must be identical rank-3 tensors",
            ag.activations.shape(), ag.gradients.shape()
        )));
    }

    let shape = ag.activations.shape();
    let (channels, fh, fw) = (shape[0], shape[1], shape[2]);
    let plane = fh * fw;

    // Weight each channel by the spatial mean of its gradient, then
    // accumulate the weighted activations. Only positive evidence for the
    // class survives the clamp.
    let mut cam = vec![0.0f32; plane];
    for ch in 0..channels {
        let grads = &ag.gradients.data()[ch * plane..(ch + 1) * plane];
        let acts = &ag.activations.data()[ch * plane..(ch + 1) * plane];
        let weight: f32 = grads.iter().sum::<f32>() / plane as f32;
        for (c, a) in cam.iter_mut().zip(acts) {
            *c += weight * a;
        }
    }
    for v in cam.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
    min_max_normalize(&mut cam);

    // Bring the coarse map up to scan resolution
    let (height, width) = (scan.height(), scan.width());
    let mut map = upsample_bilinear(&cam, fh, fw, height, width);

    let mask = if opts.apply_mask {
        let mask = circular_mask(height, width, opts.mask_margin);
        for (v, inside) in map.iter_mut().zip(&mask) {
            if !inside {
                *v = 0.0;
            }
        }
        // Normalization is recomputed over the brain area only
        normalize_masked(&mut map, &mask);
        Some(mask)
    } else {
        min_max_normalize(&mut map);
        None
    };

    // Zero out weak responses, then smooth what remains
    let in_region: Vec<f32> = match &mask {
        Some(mask) => map
            .iter()
            .zip(mask)
            .filter(|(_, inside)| **inside)
            .map(|(v, _)| *v)
            .collect(),
        None => map.clone(),
    };
    let threshold = percentile(&in_region, opts.threshold_percentile);
    for v in map.iter_mut() {
        if *v < threshold {
            *v = 0.0;
        }
    }

    if opts.blur_radius > 0 {
        gaussian_blur(&mut map, height, width, opts.blur_radius);
    }
    for v in map.iter_mut() {
        *v = v.clamp(0.0, 1.0);
    }

    debug!(
        class_index,
        feature_channels = channels,
        feature_extent = %format!("{}x{}", fh, fw),
        "saliency map generated"
    );

    Ok(SaliencyMap { data: map, height, width })
}

/// Rescales values to [0, 1]; a flat input collapses to all zeros.
fn min_max_normalize(values: &mut [f32]) {
    let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if max > min {
        for v in values.iter_mut() {
            *v = (*v - min) / (max - min);
        }
    } else {
        values.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Min-max normalization restricted to masked-in positions.
fn normalize_masked(values: &mut [f32], mask: &[bool]) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for (v, inside) in values.iter().zip(mask) {
        if *inside {
            min = min.min(*v);
            max = max.max(*v);
        }
    }
    if max > min {
        for (v, inside) in values.iter_mut().zip(mask) {
            if *inside {
                *v = (*v - min) / (max - min);
            }
        }
    }
}

/// True inside a centered circle of radius min(h, w)/2 - margin.
fn circular_mask(height: usize, width: usize, margin: u32) -> Vec<bool> {
    let cy = height as f32 / 2.0;
    let cx = width as f32 / 2.0;
    let radius = (height.min(width) as f32 / 2.0 - margin as f32).max(1.0);
    let r2 = radius * radius;

    let mut mask = vec![false; height * width];
    for y in 0..height {
        for x in 0..width {
            let dy = y as f32 - cy;
            let dx = x as f32 - cx;
            mask[y * width + x] = dy * dy + dx * dx <= r2;
        }
    }
    mask
}

/// Linearly interpolated percentile of an unsorted sample.
fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = p / 100.0 * (sorted.len() - 1) as f32;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let t = rank - low as f32;
        sorted[low] * (1.0 - t) + sorted[high] * t
    }
}

/// Bilinear upsampling of a single-channel map, pixel centers aligned.
fn upsample_bilinear(src: &[f32], sh: usize, sw: usize, dh: usize, dw: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; dh * dw];
    let scale_y = sh as f32 / dh as f32;
    let scale_x = sw as f32 / dw as f32;

    for dy in 0..dh {
        let sy = ((dy as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (sh - 1) as f32);
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let ty = sy - y0 as f32;

        for dx in 0..dw {
            let sx = ((dx as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (sw - 1) as f32);
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let tx = sx - x0 as f32;

            let top = src[y0 * sw + x0] * (1.0 - tx) + src[y0 * sw + x1] * tx;
            let bottom = src[y1 * sw + x0] * (1.0 - tx) + src[y1 * sw + x1] * tx;
            out[dy * dw + dx] = top * (1.0 - ty) + bottom * ty;
        }
    }
    out
}

/// Separable Gaussian blur; sigma follows the usual kernel-size heuristic.
fn gaussian_blur(values: &mut [f32], height: usize, width: usize, radius: usize) {
    let sigma = 0.3 * (radius as f32 - 1.0) + 0.8;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    for i in 0..=2 * radius {
        let d = i as f32 - radius as f32;
        kernel.push((-d * d / (2.0 * sigma * sigma)).exp());
    }
    let sum: f32 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }

    // Horizontal pass
    let mut tmp = vec![0.0f32; values.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0f32;
            for (i, k) in kernel.iter().enumerate() {
                let sx = (x + i).saturating_sub(radius).min(width - 1);
                acc += values[y * width + sx] * k;
            }
            tmp[y * width + x] = acc;
        }
    }

    // Vertical pass
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0f32;
            for (i, k) in kernel.iter().enumerate() {
                let sy = (y + i).saturating_sub(radius).min(height - 1);
                acc += tmp[sy * width + x] * k;
            }
            values[y * width + x] = acc;
        }
    }
}
