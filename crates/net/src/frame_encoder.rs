//! Camera frame compression for transport.
//!
//! Pipeline: drop alpha (if any) → JPEG at a fixed quality → base64 text.
//! The caller's buffer is never modified; alpha removal works on a copy.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageEncoder, ImageFormat, ImageReader, RgbImage};
use simrelay_core::{FrameError, ImageFrame};
use std::io::Cursor;
use tracing::trace;

/// JPEG quality used when none is configured.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Largest width or height the JPEG format can describe.
pub const MAX_JPEG_EXTENT: usize = u16::MAX as usize;

/// Lossy frame encoder with a fixed quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    quality: u8,
}

impl FrameEncoder {
    /// Encoder at `quality` (clamped to 1..=100).
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Compress `frame` to JPEG bytes.
    pub fn compress(&self, frame: &ImageFrame) -> Result<Vec<u8>, FrameError> {
        let (height, width) = (frame.height(), frame.width());
        if height > MAX_JPEG_EXTENT || width > MAX_JPEG_EXTENT {
            return Err(FrameError::TooLarge {
                height,
                width,
                limit: MAX_JPEG_EXTENT,
            });
        }

        let rgb = frame.to_rgb_bytes();
        let mut jpeg = Vec::with_capacity(rgb.len() / 8);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .write_image(&rgb, width as u32, height as u32, ColorType::Rgb8.into())
            .map_err(|err| FrameError::Compression(err.to_string()))?;

        trace!(
            width,
            height,
            raw = frame.as_bytes().len(),
            jpeg = jpeg.len(),
            "compressed frame"
        );
        Ok(jpeg)
    }

    /// Compress `frame` and base64-encode the result.
    pub fn encode(&self, frame: &ImageFrame) -> Result<String, FrameError> {
        Ok(STANDARD.encode(self.compress(frame)?))
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

/// Reverse of [`FrameEncoder::encode`]: base64 text → decoded RGB image.
pub fn decode_frame(text: &str) -> Result<RgbImage> {
    let jpeg = decode_frame_bytes(text)?;
    let image = ImageReader::with_format(Cursor::new(jpeg), ImageFormat::Jpeg)
        .decode()
        .context("Failed to decode JPEG frame")?;
    Ok(image.to_rgb8())
}

/// base64 text → raw JPEG bytes, without decompressing.
pub fn decode_frame_bytes(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.as_bytes())
        .context("Frame payload is not valid base64")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gradient(height: usize, width: usize, channels: usize) -> ImageFrame {
        let mut data = Vec::with_capacity(height * width * channels);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 255 / width.max(1)) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push(128);
                if channels == 4 {
                    data.push(7);
                }
            }
        }
        ImageFrame::from_raw(height, width, channels, data).unwrap()
    }

    #[test]
    fn test_encode_produces_jpeg() {
        let frame = gradient(48, 64, 3);
        let jpeg = FrameEncoder::default().compress(&frame).expect("compress");
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "JPEG SOI marker");
    }

    #[test]
    fn test_encode_roundtrip_preserves_dimensions() {
        let frame = gradient(30, 50, 3);
        let text = FrameEncoder::default().encode(&frame).expect("encode");
        let decoded = decode_frame(&text).expect("decode");
        assert_eq!(decoded.width(), 50);
        assert_eq!(decoded.height(), 30);
    }

    #[test]
    fn test_alpha_is_dropped_not_blended() {
        let rgba = gradient(16, 16, 4);
        let before = rgba.clone();
        let rgb = ImageFrame::from_raw(16, 16, 3, rgba.to_rgb_bytes()).unwrap();

        let encoder = FrameEncoder::default();
        assert_eq!(
            encoder.encode(&rgba).unwrap(),
            encoder.encode(&rgb).unwrap()
        );
        assert_eq!(rgba, before);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let frame = gradient(20, 20, 3);
        let encoder = FrameEncoder::new(85);
        assert_eq!(encoder.encode(&frame).unwrap(), encoder.encode(&frame).unwrap());
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let frame = gradient(64, 64, 3);
        let high = FrameEncoder::new(95).compress(&frame).unwrap();
        let low = FrameEncoder::new(10).compress(&frame).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(FrameEncoder::new(0), FrameEncoder::new(1));
        assert_eq!(FrameEncoder::new(200), FrameEncoder::new(100));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_frame("not base64 !!").is_err());
        assert!(decode_frame("AAAA").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Property: any valid RGB/RGBA frame encodes to non-empty text that
        /// decodes back to the same extent.
        #[test]
        fn encode_any_frame(
            height in 1usize..40,
            width in 1usize..40,
            rgba in any::<bool>(),
            seed in any::<u8>(),
        ) {
            let channels = if rgba { 4 } else { 3 };
            let data = (0..height * width * channels)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();
            let frame = ImageFrame::from_raw(height, width, channels, data).unwrap();

            let text = FrameEncoder::default().encode(&frame).unwrap();
            prop_assert!(!text.is_empty());

            let decoded = decode_frame(&text).unwrap();
            prop_assert_eq!(decoded.height() as usize, height);
            prop_assert_eq!(decoded.width() as usize, width);
        }
    }
}
