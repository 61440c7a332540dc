use image::{ImageFormat, Rgb, RgbImage};
use once_cell::sync::Lazy;
use std::io::Cursor;

use crate::vision::error::ClassifyError;
use crate::vision::normalize::ScanImage;
use crate::vision::saliency::SaliencyMap;

/// Fixed jet-style gradient: blue through cyan and yellow to red.
///
/// Built once per process; deterministic, so identical saliency maps
/// always colorize identically.
static JET_LUT: Lazy<[[u8; 3]; 256]> = Lazy::new(|| {
    let mut lut = [[0u8; 3]; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let t = i as f32 / 255.0;
        let r = (1.5 - (4.0 * t - 3.0).abs()).clamp(0.0, 1.0);
        let g = (1.5 - (4.0 * t - 2.0).abs()).clamp(0.0, 1.0);
        let b = (1.5 - (4.0 * t - 1.0).abs()).clamp(0.0, 1.0);
        *entry = [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8];
    }
    lut
});

/// Maps saliency values through the color scale to an RGB heat map.
pub fn colorize(map: &SaliencyMap) -> RgbImage {
    let mut heat = RgbImage::new(map.width() as u32, map.height() as u32);
    for y in 0..map.height() {
        for x in 0..map.width() {
            let v = map.value(y, x).clamp(0.0, 1.0);
            let color = JET_LUT[(v * 255.0) as usize];
            heat.put_pixel(x as u32, y as u32, Rgb(color));
        }
    }
    heat
}

/// Blends the color-mapped saliency over the resized scan.
///
/// `alpha` weights the heat map; the scan contributes the rest. Pure and
/// deterministic; the output has the scan's spatial dimensions.
pub fn composite(
    scan: &ScanImage,
    map: &SaliencyMap,
    alpha: f32,
) -> Result<RgbImage, ClassifyError> {
    if (map.height(), map.width()) != (scan.height(), scan.width()) {
        return Err(ClassifyError::InvariantViolation(format!(
            "Saliency extent {}x{} does not match scan extent {}x{}",
            map.height(), map.width(), scan.height(), scan.width()
        )));
    }
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(ClassifyError::InvariantViolation(format!(
            "Overlay alpha {} outside (0, 1]",
            alpha
        )));
    }

    let heat = colorize(map);
    let mut out = RgbImage::new(scan.width() as u32, scan.height() as u32);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let h = heat.get_pixel(x, y);
        let s = scan.rgb().get_pixel(x, y);
        let mut blended = [0u8; 3];
        for ch in 0..3 {
            let v = h[ch] as f32 * alpha + s[ch] as f32 * (1.0 - alpha);
            blended[ch] = v.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(blended);
    }

    Ok(out)
}

/// Encodes the overlay as PNG bytes for transport to the caller.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ClassifyError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| ClassifyError::Inference(format!("Failed to encode overlay: {}", e)))?;
    Ok(bytes)
}
