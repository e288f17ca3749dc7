//! Frame encoding for inline transport.
//!
//! Each frame is normalized to 8-bit RGB, compressed to JPEG and wrapped in
//! standard base64 so it can be embedded in a JSON request body.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, RgbImage};
use tracing::debug;
use vsum_models::frame::FRAME_MIME_TYPE;
use vsum_models::generation::DEFAULT_JPEG_QUALITY;
use vsum_models::EncodedFrame;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Converts decoded frames into transport-safe [`EncodedFrame`]s.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
    max_dimension: Option<u32>,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
            max_dimension: None,
        }
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// JPEG quality, clamped to 1..=100.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Downscale frames whose longer edge exceeds `max` pixels.
    pub fn with_max_dimension(mut self, max: Option<u32>) -> Self {
        self.max_dimension = max.filter(|&m| m > 0);
        self
    }

    /// Encode one frame.
    pub fn encode(&self, frame: &Frame) -> MediaResult<EncodedFrame> {
        let rgb = self.normalize(&frame.image);
        let (width, height) = rgb.dimensions();

        if width == 0 || height == 0 {
            return Err(MediaError::encoding(frame.index, "frame has no pixels"));
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(rgb.as_raw(), width, height, ColorType::Rgb8)
            .map_err(|e| MediaError::encoding(frame.index, e.to_string()))?;

        debug!(
            index = frame.index,
            width,
            height,
            bytes = jpeg.len(),
            "Encoded frame"
        );

        Ok(EncodedFrame {
            index: frame.index,
            timestamp: frame.timestamp,
            width,
            height,
            mime_type: FRAME_MIME_TYPE.to_string(),
            data: STANDARD.encode(&jpeg),
        })
    }

    /// Re-encode a still image (JPEG or PNG bytes) with the frame settings.
    pub fn encode_still(&self, bytes: &[u8]) -> MediaResult<EncodedFrame> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| MediaError::encoding(0, format!("unreadable image: {}", e)))?;
        self.encode(&Frame::new(0, 0.0, image))
    }

    /// Encode a whole sequence, preserving order. Any failure aborts the batch.
    pub fn encode_all(&self, frames: &[Frame]) -> MediaResult<Vec<EncodedFrame>> {
        frames.iter().map(|frame| self.encode(frame)).collect()
    }

    /// Colorspace normalization to 8-bit RGB, then optional downscale.
    fn normalize(&self, image: &DynamicImage) -> RgbImage {
        let image = match self.max_dimension {
            Some(max) if image.width().max(image.height()) > max => {
                image.resize(max, max, FilterType::Triangle)
            }
            _ => image.clone(),
        };
        image.to_rgb8()
    }
}

/// Decode an encoded frame back to an image.
pub fn decode_encoded(frame: &EncodedFrame) -> MediaResult<DynamicImage> {
    let bytes = STANDARD
        .decode(frame.data.as_bytes())
        .map_err(|e| MediaError::encoding(frame.index, format!("invalid base64: {}", e)))?;

    image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)
        .map_err(|e| MediaError::encoding(frame.index, format!("invalid JPEG: {}", e)))
}
