use std::io::Cursor;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};

/// JPEG quality used whenever a frame is re-encoded.
pub const ENCODE_QUALITY: u8 = 85;

/// One captured image: the decoded raster plus the encoded bytes used as the
/// analyzer transport format.
///
/// Frames are immutable once built. Pipeline stages take them by value.
#[derive(Clone)]
pub struct Frame {
    image: DynamicImage,
    encoded: Vec<u8>,
    format: ImageFormat,
    captured_at: DateTime<Utc>,
}

impl Frame {
    /// Decode an encoded image (PNG, JPEG, ...) and keep its original bytes.
    pub fn from_encoded(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            bail!("empty image buffer");
        }
        let format = image::guess_format(&bytes).context("unrecognized image format")?;
        let image = image::load_from_memory_with_format(&bytes, format)
            .context("failed to decode image")?;
        if image.width() == 0 || image.height() == 0 {
            bail!("image has zero area");
        }

        Ok(Self {
            image,
            encoded: bytes,
            format,
            captured_at: Utc::now(),
        })
    }

    /// Wrap a raster, encoding it as JPEG at [`ENCODE_QUALITY`].
    pub fn from_image(image: DynamicImage) -> Result<Self> {
        let encoded = encode_jpeg(&image, ENCODE_QUALITY)?;
        Ok(Self {
            image,
            encoded,
            format: ImageFormat::Jpeg,
            captured_at: Utc::now(),
        })
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.encoded)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format)
            .field("encoded_bytes", &self.encoded.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// JPEG carries no alpha channel; colour images go through RGB8 and
/// single-channel images stay single-channel.
fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let normalized = match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(image.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    };

    let mut buffer = Cursor::new(Vec::new());
    normalized
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
        .context("failed to encode frame as JPEG")?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    pub(crate) fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let image = RgbImage::from_pixel(width, height, Rgb(rgb));
        Frame::from_image(DynamicImage::ImageRgb8(image)).unwrap()
    }

    #[test]
    fn from_image_produces_decodable_jpeg() {
        let frame = solid_frame(32, 16, [200, 10, 10]);
        assert_eq!(frame.format(), ImageFormat::Jpeg);
        assert_eq!(frame.mime_type(), "image/jpeg");

        let decoded = Frame::from_encoded(frame.encoded().to_vec()).unwrap();
        assert_eq!(decoded.dimensions(), (32, 16));
        assert_eq!(decoded.format(), ImageFormat::Jpeg);
    }

    #[test]
    fn from_encoded_rejects_garbage() {
        assert!(Frame::from_encoded(Vec::new()).is_err());
        assert!(Frame::from_encoded(b"definitely not an image".to_vec()).is_err());
    }

    #[test]
    fn base64_matches_encoded_bytes() {
        let frame = solid_frame(4, 4, [0, 0, 0]);
        let decoded = BASE64.decode(frame.to_base64()).unwrap();
        assert_eq!(decoded, frame.encoded());
    }
}
