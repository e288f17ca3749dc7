//! Video download using yt-dlp.
//!
//! The downloader is the pipeline's "resolve + fetch" collaborator: given a
//! reference it leaves a media file inside a caller-owned directory and
//! reports where it put it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Minimum size for a valid cookies file (bytes).
const MIN_COOKIES_FILE_SIZE: u64 = 50;

/// Upper bound on a single download.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 1800;

/// Default yt-dlp format selector: a single progressive stream when
/// possible, so no muxing step is needed before decoding.
pub const DEFAULT_FORMAT: &str = "best[ext=mp4][vcodec!=none]/bestvideo[ext=mp4]+bestaudio/best";

/// Resolves a URL and retrieves the media into `dest_dir`.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` into `dest_dir` and return the path of the media file.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> MediaResult<PathBuf>;
}

/// yt-dlp backed fetcher.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: PathBuf,
    cookies_path: Option<PathBuf>,
    extra_args: Vec<String>,
    timeout_secs: u64,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            cookies_path: None,
            extra_args: Vec::new(),
            timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the download after `secs` seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    #[cfg(test)]
    fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Use a Netscape cookies file for authenticated platforms.
    pub fn with_cookies(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_path = Some(path.into());
        self
    }

    /// Append raw yt-dlp arguments.
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn build_args(&self, url: &str, dest_dir: &Path, cookies: Option<&Path>) -> Vec<String> {
        let template = dest_dir.join("source.%(ext)s");

        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "-f".to_string(),
            DEFAULT_FORMAT.to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
        ];

        if let Some(cp) = cookies {
            args.push("--cookies".to_string());
            args.push(cp.to_string_lossy().to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args.push(url.to_string());
        args
    }

    async fn usable_cookies(&self) -> Option<PathBuf> {
        let path = self.cookies_path.as_ref()?;

        match tokio::fs::read_to_string(path).await {
            Ok(content) if content.len() as u64 >= MIN_COOKIES_FILE_SIZE => {
                if is_valid_netscape_cookies(&content) {
                    Some(path.clone())
                } else {
                    debug!(
                        "Cookies file {} is not in Netscape format, skipping",
                        path.display()
                    );
                    None
                }
            }
            Ok(_) => {
                debug!("Cookies file {} is too small, skipping", path.display());
                None
            }
            Err(e) => {
                warn!("Failed to read cookies file {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> MediaResult<PathBuf> {
        which::which(&self.program).map_err(|_| MediaError::YtDlpNotFound)?;

        info!(url = %url, dest = %dest_dir.display(), "Downloading video with yt-dlp");

        let cookies = self.usable_cookies().await;
        let args = self.build_args(url, dest_dir, cookies.as_deref());

        let pending = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the future kills the child.
        let limit = Duration::from_secs(self.timeout_secs);
        let output = match tokio::time::timeout(limit, pending).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(url = %url, "yt-dlp timed out after {} seconds", self.timeout_secs);
                return Err(MediaError::Timeout(self.timeout_secs));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);

            if looks_rate_limited(&stderr) {
                warn!(url = %url, "Video platform rate limit detected during download");
            }

            let error_msg = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("Unknown error");
            return Err(MediaError::download_failed(format!(
                "yt-dlp failed: {}",
                error_msg
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = resolve_output_path(&stdout, dest_dir)
            .ok_or_else(|| MediaError::download_failed("Output file not created"))?;

        let size = tokio::fs::metadata(&path).await?.len();
        if size == 0 {
            return Err(MediaError::download_failed("Downloaded file is empty"));
        }

        info!(
            output = %path.display(),
            size_mb = size as f64 / (1024.0 * 1024.0),
            "Downloaded video successfully"
        );

        Ok(path)
    }
}

/// Find the file yt-dlp produced: the printed path if it exists, otherwise
/// the first `source.*` file in the destination directory.
fn resolve_output_path(stdout: &str, dest_dir: &Path) -> Option<PathBuf> {
    let printed = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_file());

    printed.or_else(|| {
        std::fs::read_dir(dest_dir)
            .ok()?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .find(|p| {
                p.file_stem().and_then(|s| s.to_str()) == Some("source")
                    && p.extension().and_then(|e| e.to_str()) != Some("part")
            })
    })
}

/// Rate-limit markers in yt-dlp diagnostics. Used for logging only.
fn looks_rate_limited(stderr: &str) -> bool {
    stderr.contains("429")
        || stderr.contains("Too Many Requests")
        || stderr.contains("rate limit")
        || stderr.contains("Sign in to confirm")
}

/// Validate that a cookies file appears to be in Netscape format.
fn is_valid_netscape_cookies(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File")
        || content.starts_with("# HTTP Cookie File")
    {
        return true;
    }

    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .any(|l| l.split('\t').count() >= 6)
}
