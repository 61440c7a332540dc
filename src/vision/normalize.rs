use image::imageops::FilterType;
use image::RgbImage;

use crate::vision::error::ClassifyError;
use crate::vision::tensor::Tensor;

/// The input geometry a model expects: spatial extent plus channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl InputShape {
    /// Square RGB input of the given side length
    pub fn square_rgb(side: usize) -> Self {
        Self { height: side, width: side, channels: 3 }
    }
}

/// Pixel rescaling applied before inference.
///
/// Each model family declares the policy it was trained with; the
/// normalizer applies whichever policy the selected handle reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationPolicy {
    /// Scale intensities into [0, 1] (x / 255)
    ZeroToOne,
    /// Scale intensities into [-1, 1] (x / 127.5 - 1)
    SymmetricUnit,
}

impl NormalizationPolicy {
    /// Rescales one 8-bit intensity
    pub fn apply(&self, value: u8) -> f32 {
        match self {
            NormalizationPolicy::ZeroToOne => value as f32 / 255.0,
            NormalizationPolicy::SymmetricUnit => value as f32 / 127.5 - 1.0,
        }
    }

    /// Name used in logs and model listings
    pub fn name(&self) -> &'static str {
        match self {
            NormalizationPolicy::ZeroToOne => "zero-to-one",
            NormalizationPolicy::SymmetricUnit => "symmetric-unit",
        }
    }
}

/// A decoded, resized, rescaled scan ready for inference.
///
/// Holds both the resized 8-bit pixels (for overlay compositing) and the
/// normalized CHW tensor (for the forward pass). Immutable once built.
pub struct ScanImage {
    rgb: RgbImage,
    tensor: Tensor,
    policy: NormalizationPolicy,
}

impl ScanImage {
    /// The resized scan pixels at their original intensity range
    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// The normalized (channels, height, width) tensor
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// The policy the tensor was rescaled with
    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    pub fn height(&self) -> usize {
        self.rgb.height() as usize
    }

    pub fn width(&self) -> usize {
        self.rgb.width() as usize
    }
}

/// Decodes raw image bytes and prepares them for a model.
///
/// Resizing uses triangle (bilinear) filtering, which is deterministic for
/// a given input. Fails with `ClassifyError::Decode` when the bytes are
/// empty or not a recognized image format.
pub fn normalize(
    raw: &[u8],
    shape: InputShape,
    policy: NormalizationPolicy,
) -> Result<ScanImage, ClassifyError> {
    if raw.is_empty() {
        return Err(ClassifyError::Decode("empty input buffer".to_string()));
    }
    if shape.channels != 3 {
        // Registry-built handles always declare RGB input
        return Err(ClassifyError::InvariantViolation(format!(
            "Unsupported channel count: {}",
            shape.channels
        )));
    }

    let decoded = image::load_from_memory(raw)?;
    let rgb = image::imageops::resize(
        &decoded.to_rgb8(),
        shape.width as u32,
        shape.height as u32,
        FilterType::Triangle,
    );

    // Repack HWC u8 pixels into a CHW f32 tensor under the model's policy
    let (h, w) = (shape.height, shape.width);
    let mut data = vec![0.0f32; 3 * h * w];
    for y in 0..h {
        for x in 0..w {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            for ch in 0..3 {
                data[ch * h * w + y * w + x] = policy.apply(pixel[ch]);
            }
        }
    }

    let tensor = Tensor::new(data, vec![3, h, w])?;

    Ok(ScanImage { rgb, tensor, policy })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    /// Encodes a uniform gray image as PNG bytes
    fn png_bytes(width: u32, height: u32, value: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([value, value, value]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn test_empty_input_is_decode_error() {
        let result = normalize(&[], InputShape::square_rgb(8), NormalizationPolicy::ZeroToOne);
        assert!(matches!(result, Err(ClassifyError::Decode(_))));
    }

    #[test]
    fn test_garbage_input_is_decode_error() {
        let result = normalize(
            b"definitely not an image",
            InputShape::square_rgb(8),
            NormalizationPolicy::ZeroToOne,
        );
        assert!(matches!(result, Err(ClassifyError::Decode(_))));
    }

    #[test]
    fn test_resize_to_target_shape() {
        let bytes = png_bytes(32, 20, 128);
        let scan = normalize(&bytes, InputShape::square_rgb(8), NormalizationPolicy::ZeroToOne).unwrap();

        assert_eq!((scan.height(), scan.width()), (8, 8));
        assert_eq!(scan.tensor().shape(), &[3, 8, 8]);
    }

    #[test]
    fn test_zero_to_one_policy_range() {
        let bytes = png_bytes(4, 4, 255);
        let scan = normalize(&bytes, InputShape::square_rgb(4), NormalizationPolicy::ZeroToOne).unwrap();

        for v in scan.tensor().data() {
            assert!((v - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_symmetric_unit_policy_range() {
        let bytes = png_bytes(4, 4, 0);
        let scan = normalize(&bytes, InputShape::square_rgb(4), NormalizationPolicy::SymmetricUnit).unwrap();

        for v in scan.tensor().data() {
            assert!((v + 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let bytes = png_bytes(16, 16, 77);
        let a = normalize(&bytes, InputShape::square_rgb(8), NormalizationPolicy::ZeroToOne).unwrap();
        let b = normalize(&bytes, InputShape::square_rgb(8), NormalizationPolicy::ZeroToOne).unwrap();

        assert_eq!(a.tensor().data(), b.tensor().data());
        assert_eq!(a.rgb().as_raw(), b.rgb().as_raw());
    }
}
