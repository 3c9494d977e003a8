//! Legibility transform applied before text recognition.
//!
//! Steps, in order: centered crop, resample, BT.709 grayscale, threshold to
//! pure black/white, JPEG re-encode. Centered crops drop peripheral UI chrome
//! (chat panels, minimaps, status bars) that otherwise produces stray text.

pub mod config;

pub use config::{PreprocessConfig, PreprocessPreset};

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, RgbaImage};

use crate::frame::Frame;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

/// Run the full transform. Never fails: on any internal error the original
/// frame is returned so analysis can still proceed on the raw image.
pub fn preprocess(frame: &Frame, config: &PreprocessConfig) -> Frame {
    match try_preprocess(frame, config) {
        Ok(processed) => processed,
        Err(err) => {
            log_warn!("preprocessing failed, using original frame: {err:#}");
            frame.clone()
        }
    }
}

fn try_preprocess(frame: &Frame, config: &PreprocessConfig) -> Result<Frame> {
    config.validate().map_err(|msg| anyhow!(msg))?;

    let (width, height) = frame.dimensions();
    let rect = centered_crop(width, height, config.crop_width_fraction, config.crop_height_fraction)
        .ok_or_else(|| anyhow!("frame {width}x{height} too small to crop"))?;

    let cropped = frame.image().crop_imm(rect.x, rect.y, rect.width, rect.height);

    let scaled_width = scaled_dimension(rect.width, config.scale_factor)?;
    let scaled_height = scaled_dimension(rect.height, config.scale_factor)?;
    let scaled = if (scaled_width, scaled_height) == (rect.width, rect.height) {
        cropped
    } else {
        cropped.resize_exact(scaled_width, scaled_height, FilterType::Triangle)
    };

    let gray = grayscale(&scaled.to_rgba8());
    let binary = binarize(&gray, config.binarization_threshold);

    Frame::from_image(DynamicImage::ImageLuma8(binary))
        .map(|processed| processed.with_captured_at(frame.captured_at()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Centered rectangle covering the given fractions of the frame.
pub fn centered_crop(
    width: u32,
    height: u32,
    width_fraction: f32,
    height_fraction: f32,
) -> Option<CropRect> {
    if width == 0 || height == 0 {
        return None;
    }
    let crop_width = ((width as f32 * width_fraction).round() as u32).clamp(1, width);
    let crop_height = ((height as f32 * height_fraction).round() as u32).clamp(1, height);

    Some(CropRect {
        x: (width - crop_width) / 2,
        y: (height - crop_height) / 2,
        width: crop_width,
        height: crop_height,
    })
}

fn scaled_dimension(value: u32, factor: f32) -> Result<u32> {
    let scaled = (value as f64 * factor as f64).round();
    if scaled < 1.0 || scaled > u32::MAX as f64 {
        return Err(anyhow!("scaled dimension {scaled} out of range"));
    }
    Ok(scaled as u32)
}

/// Luminosity grayscale with BT.709 weights. Alpha is ignored.
pub fn grayscale(image: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        let value = LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Map every pixel to 255 when `>= threshold`, else 0.
///
/// Idempotent for any threshold in 1..=255: a pure black/white image maps to
/// itself.
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = if pixel.0[0] >= threshold { 255 } else { 0 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::solid_frame;
    use image::{GenericImageView, Rgba};

    #[test]
    fn centered_crop_matches_presets() {
        let normal = PreprocessConfig::normal();
        let rect = centered_crop(1000, 500, normal.crop_width_fraction, normal.crop_height_fraction)
            .unwrap();
        assert_eq!(rect, CropRect { x: 150, y: 100, width: 700, height: 300 });

        let focus = PreprocessConfig::focus();
        let rect = centered_crop(1000, 500, focus.crop_width_fraction, focus.crop_height_fraction)
            .unwrap();
        assert_eq!(rect, CropRect { x: 300, y: 150, width: 400, height: 200 });
    }

    #[test]
    fn centered_crop_never_collapses_to_zero() {
        let rect = centered_crop(1, 1, 0.1, 0.1).unwrap();
        assert_eq!((rect.width, rect.height), (1, 1));
        assert!(centered_crop(0, 10, 0.5, 0.5).is_none());
    }

    #[test]
    fn grayscale_uses_bt709_weights() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        img.put_pixel(2, 0, Rgba([0, 0, 255, 0]));

        let gray = grayscale(&img);
        assert_eq!(gray.get_pixel(0, 0).0[0], 54);
        assert_eq!(gray.get_pixel(1, 0).0[0], 182);
        assert_eq!(gray.get_pixel(2, 0).0[0], 18);
    }

    #[test]
    fn binarize_is_idempotent() {
        let gray = GrayImage::from_fn(16, 16, |x, y| Luma([((x * 16 + y) % 256) as u8]));
        for threshold in [1u8, 64, 128, 200, 255] {
            let once = binarize(&gray, threshold);
            let twice = binarize(&once, threshold);
            assert_eq!(once, twice, "threshold {threshold}");
            assert!(once.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        }
    }

    #[test]
    fn binarize_threshold_is_inclusive() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([127 + x as u8]));
        let out = binarize(&gray, 128);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
        assert_eq!(out.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn preprocess_crops_scales_and_binarizes() {
        let frame = solid_frame(100, 50, [240, 240, 240]);
        let processed = preprocess(&frame, &PreprocessConfig::normal());

        assert_eq!(processed.dimensions(), (140, 60));
        let luma = processed.image().to_luma8();
        // JPEG is lossy; a flat white field stays near white.
        assert!(luma.pixels().all(|p| p.0[0] > 200));
    }

    #[test]
    fn preprocess_falls_back_to_original_on_bad_config() {
        let frame = solid_frame(20, 20, [10, 10, 10]);
        let bad = PreprocessConfig {
            crop_width_fraction: 0.0,
            ..PreprocessConfig::normal()
        };
        let out = preprocess(&frame, &bad);
        assert_eq!(out.encoded(), frame.encoded());
        assert_eq!(out.image().dimensions(), (20, 20));
    }
}
