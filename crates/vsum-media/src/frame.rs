//! Decoded frames.

use image::DynamicImage;

/// A single decoded raster image at a sampled timestamp.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Sampling slot (0-based); ascending slots are ascending timestamps
    pub index: usize,
    /// Offset into the video in seconds
    pub timestamp: f64,
    /// Decoded pixels in whatever layout the decoder produced
    pub image: DynamicImage,
}

impl Frame {
    pub fn new(index: usize, timestamp: f64, image: DynamicImage) -> Self {
        Self {
            index,
            timestamp,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Channels per pixel of the decoded buffer.
    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }
}

/// Output of one sampling pass.
#[derive(Debug, Clone)]
pub struct SampledFrames {
    /// Decoded frames in ascending timestamp order
    pub frames: Vec<Frame>,
    /// Number of frames that were requested
    pub requested: usize,
    /// Slots whose timestamp could not be decoded
    pub skipped: Vec<usize>,
}

impl SampledFrames {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// True when every requested timestamp produced a frame.
    pub fn is_complete(&self) -> bool {
        self.frames.len() == self.requested
    }

    /// Timestamps of the decoded frames, in order.
    pub fn timestamps(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.timestamp).collect()
    }
}
