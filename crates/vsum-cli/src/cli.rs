//! Command-line arguments and interactive input.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use vsum_media::ShortfallPolicy;

/// Summarize a video from a handful of sampled frames.
///
/// The reference may be a URL, a bare YouTube video id or a local file.
/// When omitted it is read from standard input.
#[derive(Parser, Debug, Clone)]
#[clap(name = "vsum", version)]
pub struct Args {
    /// Video URL, YouTube id or local path
    pub reference: Option<String>,

    /// Number of frames to sample
    #[clap(short = 'n', long = "frames")]
    pub frames: Option<usize>,

    /// Directory for temporary downloads
    #[clap(long = "work-dir")]
    pub work_dir: Option<PathBuf>,

    /// Directory the markdown report is written to
    #[clap(long = "report-dir")]
    pub report_dir: Option<PathBuf>,

    /// Print the summary without writing a report file
    #[clap(long = "no-report")]
    pub no_report: bool,

    /// What to do when some frames cannot be decoded (tolerate or strict)
    #[clap(long = "shortfall")]
    pub shortfall: Option<ShortfallPolicy>,

    /// JPEG quality for encoded frames (1-100)
    #[clap(long = "jpeg-quality")]
    pub jpeg_quality: Option<u8>,

    /// Downscale frames so the longer edge is at most this many pixels
    #[clap(long = "max-dimension")]
    pub max_dimension: Option<u32>,

    /// Netscape cookies file handed to yt-dlp
    #[clap(long = "cookies")]
    pub cookies: Option<PathBuf>,

    /// Skip the video metadata lookup
    #[clap(long = "no-context")]
    pub no_context: bool,
}

/// Ask for a reference on stdin.
pub async fn prompt_reference() -> anyhow::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"Enter a video URL, YouTube id or file path: ")
        .await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read video reference from stdin")?;

    let line = line.trim();
    if line.is_empty() {
        bail!("no video reference given");
    }
    Ok(line.to_string())
}
