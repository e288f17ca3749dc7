#![deny(unreachable_patterns)]
//! Media handling for the vsum video summarizer.
//!
//! This crate provides:
//! - Acquisition of local files and remote videos (yt-dlp) into scoped workspaces
//! - Stream inspection with FFprobe
//! - Evenly spaced frame sampling through FFmpeg single-frame decodes
//! - JPEG + base64 encoding of sampled frames

pub mod acquire;
pub mod command;
pub mod download;
pub mod encode;
pub mod error;
pub mod frame;
pub mod stream;
pub mod sample;

pub use acquire::{MediaAcquirer, MediaHandle};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use download::{MediaFetcher, YtDlpFetcher, DEFAULT_DOWNLOAD_TIMEOUT_SECS};
pub use encode::{decode_encoded, FrameEncoder};
pub use error::{MediaError, MediaResult, MediaStage};
pub use frame::{Frame, SampledFrames};
pub use stream::{read_stream_info, FfprobeInspector, StreamInfo, StreamInspector};
pub use sample::{
    sample_timestamps, DecoderFactory, FfmpegDecoderFactory, FfmpegFrameDecoder, FrameDecoder,
    FrameSampler, ShortfallPolicy,
};
