//! Run configuration.

use std::path::PathBuf;

use vsum_media::{
    check_ffmpeg, check_ffprobe, check_ytdlp, ShortfallPolicy, DEFAULT_DOWNLOAD_TIMEOUT_SECS,
};
use vsum_models::generation::{DEFAULT_FRAME_COUNT, DEFAULT_JPEG_QUALITY};

use crate::cli::Args;
use crate::error::ConfigError;

/// Settings for one summarization run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Frames to sample per video
    pub frame_count: usize,
    /// Work directory for temporary downloads
    pub work_dir: PathBuf,
    /// Directory markdown reports are written to
    pub report_dir: PathBuf,
    /// Whether to persist a report at all
    pub write_report: bool,
    /// Behavior when only some frames decode
    pub shortfall: ShortfallPolicy,
    /// JPEG quality for encoded frames
    pub jpeg_quality: u8,
    /// Longest frame edge after downscaling, if any
    pub max_dimension: Option<u32>,
    /// Cookies file for yt-dlp
    pub cookies: Option<PathBuf>,
    /// Per-frame FFmpeg decode timeout in seconds
    pub decode_timeout_secs: u64,
    /// yt-dlp download timeout in seconds
    pub download_timeout_secs: u64,
    /// Whether to look up video metadata
    pub fetch_context: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            work_dir: std::env::temp_dir().join("vsum"),
            report_dir: PathBuf::from("reports"),
            write_report: true,
            shortfall: ShortfallPolicy::Tolerate,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_dimension: None,
            cookies: None,
            decode_timeout_secs: 60,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            fetch_context: true,
        }
    }
}

impl RunConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let shortfall = match std::env::var("VSUM_SHORTFALL") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .parse()
                .map_err(|e: String| ConfigError::new(format!("VSUM_SHORTFALL: {}", e)))?,
            _ => defaults.shortfall,
        };

        Ok(Self {
            frame_count: std::env::var("VSUM_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.frame_count),
            work_dir: std::env::var("VSUM_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            report_dir: std::env::var("VSUM_REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.report_dir),
            write_report: defaults.write_report,
            shortfall,
            jpeg_quality: std::env::var("VSUM_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jpeg_quality),
            max_dimension: std::env::var("VSUM_MAX_DIMENSION")
                .ok()
                .and_then(|s| s.parse().ok()),
            cookies: std::env::var("YTDLP_COOKIES_PATH").ok().map(PathBuf::from),
            decode_timeout_secs: std::env::var("VSUM_DECODE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.decode_timeout_secs),
            download_timeout_secs: std::env::var("VSUM_DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.download_timeout_secs),
            fetch_context: defaults.fetch_context,
        })
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_args(mut self, args: &Args) -> Result<Self, ConfigError> {
        if let Some(frames) = args.frames {
            self.frame_count = frames;
        }
        if let Some(dir) = &args.work_dir {
            self.work_dir = dir.clone();
        }
        if let Some(dir) = &args.report_dir {
            self.report_dir = dir.clone();
        }
        if let Some(policy) = args.shortfall {
            self.shortfall = policy;
        }
        if let Some(quality) = args.jpeg_quality {
            self.jpeg_quality = quality;
        }
        if args.max_dimension.is_some() {
            self.max_dimension = args.max_dimension;
        }
        if let Some(cookies) = &args.cookies {
            self.cookies = Some(cookies.clone());
        }
        if args.no_report {
            self.write_report = false;
        }
        if args.no_context {
            self.fetch_context = false;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_count == 0 {
            return Err(ConfigError::new("frame count must be at least 1"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::new(format!(
                "JPEG quality {} outside 1-100",
                self.jpeg_quality
            )));
        }
        if self.download_timeout_secs == 0 {
            return Err(ConfigError::new("download timeout must be positive"));
        }
        if self.max_dimension == Some(0) {
            return Err(ConfigError::new("max dimension must be positive"));
        }
        Ok(())
    }
}

/// Verify the external tools a run needs are on `PATH`. yt-dlp is only
/// required when the reference has to be downloaded.
pub fn check_tools(needs_download: bool) -> Result<(), ConfigError> {
    check_ffmpeg().map_err(|e| ConfigError::new(e.to_string()))?;
    check_ffprobe().map_err(|e| ConfigError::new(e.to_string()))?;
    if needs_download {
        check_ytdlp().map_err(|e| ConfigError::new(e.to_string()))?;
    }
    Ok(())
}
