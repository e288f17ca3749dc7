//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Pipeline stage a media error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStage {
    Acquisition,
    Sampling,
    Encoding,
    /// Tool-level failures not yet attributed to a stage.
    Tooling,
}

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Media acquisition failed for '{reference}': {message}")]
    Acquisition { reference: String, message: String },

    #[error("Stream unreadable: {0}")]
    Sampling(String),

    #[error("No frames decoded out of {requested} requested")]
    EmptyResult { requested: usize },

    #[error("Only {decoded} of {requested} frames decoded (strict sampling)")]
    Shortfall { decoded: usize, requested: usize },

    #[error("Frame encoding failed at index {index}: {message}")]
    Encoding { index: usize, message: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Create an acquisition error for a reference.
    pub fn acquisition(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Acquisition {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create a sampling error.
    pub fn sampling(message: impl Into<String>) -> Self {
        Self::Sampling(message.into())
    }

    /// Create an encoding error for one frame.
    pub fn encoding(index: usize, message: impl Into<String>) -> Self {
        Self::Encoding {
            index,
            message: message.into(),
        }
    }

    /// Stage this error should be reported under.
    pub fn stage(&self) -> MediaStage {
        match self {
            MediaError::Acquisition { .. }
            | MediaError::DownloadFailed { .. }
            | MediaError::YtDlpNotFound => MediaStage::Acquisition,
            MediaError::Sampling(_)
            | MediaError::EmptyResult { .. }
            | MediaError::Shortfall { .. } => MediaStage::Sampling,
            MediaError::Encoding { .. } => MediaStage::Encoding,
            _ => MediaStage::Tooling,
        }
    }

    /// True when no frame at all could be decoded.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, MediaError::EmptyResult { .. })
    }
}
