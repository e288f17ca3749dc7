//! Deterministic temporal frame sampling.
//!
//! `count` timestamps are spread evenly over `[0, duration)` with
//! `t_i = duration * i / count`. Each timestamp is decoded independently;
//! a failed decode skips that slot and sampling carries on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::acquire::MediaHandle;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, SampledFrames};

/// Per-frame decode timeout.
const DEFAULT_DECODE_TIMEOUT_SECS: u64 = 60;

/// What to do when some, but not all, timestamps fail to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShortfallPolicy {
    /// Warn and continue with the frames that decoded.
    #[default]
    Tolerate,
    /// Fail the run unless every timestamp decoded.
    Strict,
}

impl FromStr for ShortfallPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tolerate" | "warn" => Ok(Self::Tolerate),
            "strict" | "fail" => Ok(Self::Strict),
            other => Err(format!(
                "unknown shortfall policy '{}' (expected tolerate or strict)",
                other
            )),
        }
    }
}

/// Compute the sampling timestamps for a video.
pub fn sample_timestamps(duration: f64, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| duration * i as f64 / count as f64)
        .collect()
}

/// Decodes the frame nearest to a timestamp.
#[async_trait]
pub trait FrameDecoder: Send + Sync {
    async fn decode_at(&self, timestamp: f64) -> MediaResult<DynamicImage>;
}

/// Opens a [`FrameDecoder`] over a media file.
pub trait DecoderFactory: Send + Sync {
    fn open(&self, path: &Path) -> Box<dyn FrameDecoder>;
}

/// Opens [`FfmpegFrameDecoder`]s sharing one runner.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoderFactory {
    runner: Option<FfmpegRunner>,
}

impl FfmpegDecoderFactory {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self {
            runner: Some(runner),
        }
    }
}

impl DecoderFactory for FfmpegDecoderFactory {
    fn open(&self, path: &Path) -> Box<dyn FrameDecoder> {
        let mut decoder = FfmpegFrameDecoder::new(path);
        if let Some(runner) = &self.runner {
            decoder = decoder.with_runner(runner.clone());
        }
        Box::new(decoder)
    }
}

/// Decodes single frames by seeking with FFmpeg and piping a PNG back.
#[derive(Debug, Clone)]
pub struct FfmpegFrameDecoder {
    path: PathBuf,
    runner: FfmpegRunner,
}

impl FfmpegFrameDecoder {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            runner: FfmpegRunner::new().with_timeout(DEFAULT_DECODE_TIMEOUT_SECS),
        }
    }

    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }
}

#[async_trait]
impl FrameDecoder for FfmpegFrameDecoder {
    async fn decode_at(&self, timestamp: f64) -> MediaResult<DynamicImage> {
        let cmd = FfmpegCommand::piped(&self.path)
            .seek(timestamp)
            .single_frame()
            .image_pipe("png");

        let bytes = self.runner.capture(&cmd).await?;
        if bytes.is_empty() {
            return Err(MediaError::sampling(format!(
                "no frame decodable at {:.3}s",
                timestamp
            )));
        }

        image::load_from_memory_with_format(&bytes, ImageFormat::Png).map_err(|e| {
            MediaError::sampling(format!("undecodable frame at {:.3}s: {}", timestamp, e))
        })
    }
}

/// Samples a fixed number of frames from a media handle.
#[derive(Clone)]
pub struct FrameSampler {
    policy: ShortfallPolicy,
    decoders: Arc<dyn DecoderFactory>,
}

impl fmt::Debug for FrameSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSampler")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(ShortfallPolicy::default())
    }
}

impl FrameSampler {
    pub fn new(policy: ShortfallPolicy) -> Self {
        Self {
            policy,
            decoders: Arc::new(FfmpegDecoderFactory::default()),
        }
    }

    /// Use a specific runner (timeout, cancellation) for FFmpeg decodes.
    pub fn with_runner(self, runner: FfmpegRunner) -> Self {
        self.with_decoder_factory(Arc::new(FfmpegDecoderFactory::new(runner)))
    }

    /// Decode through `factory` instead of FFmpeg.
    pub fn with_decoder_factory(mut self, factory: Arc<dyn DecoderFactory>) -> Self {
        self.decoders = factory;
        self
    }

    pub fn policy(&self) -> ShortfallPolicy {
        self.policy
    }

    /// Sample `count` frames from the handle's media.
    pub async fn sample(&self, handle: &MediaHandle, count: usize) -> MediaResult<SampledFrames> {
        ensure_readable(handle.path()).await?;

        let decoder = self.decoders.open(handle.path());
        self.sample_with(decoder.as_ref(), handle.duration(), count)
            .await
    }

    /// Sample `count` frames through an arbitrary decoder.
    pub async fn sample_with<D>(
        &self,
        decoder: &D,
        duration: f64,
        count: usize,
    ) -> MediaResult<SampledFrames>
    where
        D: FrameDecoder + ?Sized,
    {
        if count == 0 {
            return Err(MediaError::sampling("frame count must be at least 1"));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(MediaError::sampling(format!("invalid duration {}", duration)));
        }

        let mut timestamps = sample_timestamps(duration, count);
        // A zero-length stream has a single distinct position.
        timestamps.dedup();
        if timestamps.len() < count {
            warn!(
                duration,
                requested = count,
                distinct = timestamps.len(),
                "Stream too short for distinct timestamps, sampling fewer frames"
            );
        }
        let count = timestamps.len();
        debug!(?timestamps, "Sampling frames");

        let mut frames = Vec::with_capacity(count);
        let mut skipped = Vec::new();

        for (index, &timestamp) in timestamps.iter().enumerate() {
            match decoder.decode_at(timestamp).await {
                Ok(image) => frames.push(Frame::new(index, timestamp, image)),
                Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
                Err(e) => {
                    warn!(index, timestamp, "Skipping frame: {}", e);
                    counter!("vsum_frames_skipped_total").increment(1);
                    skipped.push(index);
                }
            }
        }

        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        if frames.is_empty() {
            return Err(MediaError::EmptyResult { requested: count });
        }

        if !skipped.is_empty() {
            match self.policy {
                ShortfallPolicy::Strict => {
                    return Err(MediaError::Shortfall {
                        decoded: frames.len(),
                        requested: count,
                    });
                }
                ShortfallPolicy::Tolerate => warn!(
                    decoded = frames.len(),
                    requested = count,
                    ?skipped,
                    "Proceeding with a partial frame set"
                ),
            }
        }

        counter!("vsum_frames_decoded_total").increment(frames.len() as u64);
        info!(decoded = frames.len(), requested = count, "Sampling complete");

        Ok(SampledFrames {
            frames,
            requested: count,
            skipped,
        })
    }
}

async fn ensure_readable(path: &Path) -> MediaResult<()> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| MediaError::sampling(format!("cannot open {}: {}", path.display(), e)))?;

    if !meta.is_file() || meta.len() == 0 {
        return Err(MediaError::sampling(format!(
            "{} is not a readable media file",
            path.display()
        )));
    }

    tokio::fs::File::open(path)
        .await
        .map_err(|e| MediaError::sampling(format!("cannot open {}: {}", path.display(), e)))?;

    Ok(())
}
