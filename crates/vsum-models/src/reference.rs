//! Video references.

use std::fmt;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::{extract_youtube_id, is_youtube_domain, is_youtube_id};

/// Errors produced while parsing a video reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("video reference is empty")]
    Empty,

    #[error("unsupported URL scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("invalid video URL: {0}")]
    InvalidUrl(String),
}

/// What kind of source a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// An http(s) URL resolved by the downloader.
    Url,
    /// A bare YouTube video id.
    YoutubeId,
    /// A file already present on local storage.
    LocalPath,
}

/// YouTube hosts accepted without a scheme, e.g. `youtube.com/watch?v=...`.
const SCHEMELESS_HOSTS: [&str; 5] = [
    "youtube.com/",
    "www.youtube.com/",
    "m.youtube.com/",
    "music.youtube.com/",
    "youtu.be/",
];

/// Identifier or URL of the source video. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoReference(String);

impl VideoReference {
    /// Parse a reference supplied by the caller.
    pub fn parse(input: &str) -> Result<Self, ReferenceError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ReferenceError::Empty);
        }

        if let Some((scheme, _)) = input.split_once("://") {
            let scheme = scheme.to_ascii_lowercase();
            if scheme != "http" && scheme != "https" {
                return Err(ReferenceError::UnsupportedScheme(scheme));
            }
            url::Url::parse(input).map_err(|e| ReferenceError::InvalidUrl(e.to_string()))?;
        } else if is_schemeless_youtube(input) {
            url::Url::parse(&format!("https://{}", input))
                .map_err(|e| ReferenceError::InvalidUrl(e.to_string()))?;
        }

        Ok(Self(input.to_string()))
    }

    /// The reference exactly as supplied (trimmed).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify the reference.
    pub fn kind(&self) -> ReferenceKind {
        if self.0.contains("://") {
            ReferenceKind::Url
        } else if is_schemeless_youtube(&self.0) && !Path::new(&self.0).exists() {
            ReferenceKind::Url
        } else if is_youtube_id(&self.0) && !Path::new(&self.0).exists() {
            ReferenceKind::YoutubeId
        } else {
            ReferenceKind::LocalPath
        }
    }

    /// URL handed to the downloader. Bare YouTube ids are expanded to a watch URL.
    pub fn download_url(&self) -> Option<String> {
        match self.kind() {
            ReferenceKind::Url if !self.0.contains("://") => Some(format!("https://{}", self.0)),
            ReferenceKind::Url => Some(self.0.clone()),
            ReferenceKind::YoutubeId => Some(format!("https://www.youtube.com/watch?v={}", self.0)),
            ReferenceKind::LocalPath => None,
        }
    }

    /// Local file path, for references that point at local storage.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self.kind() {
            ReferenceKind::LocalPath => Some(PathBuf::from(&self.0)),
            _ => None,
        }
    }

    /// YouTube video id, when the reference is a YouTube URL or a bare id.
    pub fn youtube_id(&self) -> Option<String> {
        match self.kind() {
            ReferenceKind::YoutubeId => Some(self.0.clone()),
            ReferenceKind::Url if is_youtube_domain(&self.0) => extract_youtube_id(&self.0).ok(),
            _ => None,
        }
    }

    /// Short filesystem-safe label for report file names.
    pub fn slug(&self) -> String {
        if let Some(id) = self.youtube_id() {
            return id;
        }

        let tail = self
            .0
            .trim_end_matches('/')
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let stem = tail.split(['?', '#']).next().unwrap_or_default();
        let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(stem);

        let slug: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(48)
            .collect();

        if slug.is_empty() {
            "video".to_string()
        } else {
            slug
        }
    }
}

fn is_schemeless_youtube(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    SCHEMELESS_HOSTS.iter().any(|host| lower.starts_with(host))
}

impl fmt::Display for VideoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VideoReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
