//! Optional video context lookup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use vsum_media::FrameEncoder;
use vsum_models::context::keys;
use vsum_models::{EncodedFrame, VideoContext, VideoReference};

pub const YOUTUBE_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const YOUTUBE_API_KEY_VAR: &str = "YOUTUBE_API_KEY";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("video not found: {0}")]
    NotFound(String),

    #[error("unusable thumbnail: {0}")]
    Thumbnail(String),
}

/// Supplies descriptive context for a video.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Look up context for `reference`. References the provider does not
    /// know about yield an empty context.
    async fn lookup(&self, reference: &VideoReference) -> Result<VideoContext, MetadataError>;
}

/// Provider that never supplies context.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

#[async_trait]
impl ContextProvider for NoContext {
    fn name(&self) -> &str {
        "none"
    }

    async fn lookup(&self, _reference: &VideoReference) -> Result<VideoContext, MetadataError> {
        Ok(VideoContext::new())
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Option<Snippet>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: Option<String>,
    description: Option<String>,
    channel_title: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

// Counts arrive as decimal strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
}

/// YouTube Data API v3 `videos` lookup. The high-resolution thumbnail is
/// downloaded and attached to the context as an image.
pub struct YouTubeDataProvider {
    api_key: String,
    base_url: String,
    client: Client,
    encoder: FrameEncoder,
}

impl YouTubeDataProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, MetadataError> {
        Self::with_base_url(YOUTUBE_API_BASE_URL, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, MetadataError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            encoder: FrameEncoder::default(),
        })
    }

    /// Encoder settings applied to the thumbnail.
    pub fn with_encoder(mut self, encoder: FrameEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    async fn fetch_thumbnail(&self, url: &str) -> Result<EncodedFrame, MetadataError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Api {
                status: status.as_u16(),
                body: format!("thumbnail {}", url),
            });
        }

        let bytes = response.bytes().await?;
        self.encoder
            .encode_still(&bytes)
            .map_err(|e| MetadataError::Thumbnail(e.to_string()))
    }

    /// Build from `YOUTUBE_API_KEY`; `None` when the key is unset or empty.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var(YOUTUBE_API_KEY_VAR).ok()?;
        if key.trim().is_empty() {
            return None;
        }
        match Self::new(key) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!("Cannot build YouTube metadata client: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl ContextProvider for YouTubeDataProvider {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn lookup(&self, reference: &VideoReference) -> Result<VideoContext, MetadataError> {
        let Some(video_id) = reference.youtube_id() else {
            debug!(reference = %reference, "Not a YouTube reference; no context");
            return Ok(VideoContext::new());
        };

        let url = format!("{}/videos", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet,statistics"),
                ("id", video_id.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetadataError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let list: VideoListResponse = response.json().await?;
        let item = list
            .items
            .into_iter()
            .next()
            .ok_or_else(|| MetadataError::NotFound(video_id.clone()))?;

        let mut context = VideoContext::new();
        if let Some(snippet) = item.snippet {
            if let Some(title) = snippet.title {
                context.insert(keys::TITLE, title);
            }
            if let Some(description) = snippet.description {
                context.insert(keys::DESCRIPTION, description);
            }
            if let Some(channel) = snippet.channel_title {
                context.insert(keys::CHANNEL, channel);
            }
            if let Some(high) = snippet.thumbnails.and_then(|t| t.high) {
                context.insert(keys::THUMBNAIL_URL, high.url);
            }
        }
        if let Some(stats) = item.statistics {
            if let Some(views) = stats.view_count {
                context.insert(keys::VIEW_COUNT, views);
            }
            if let Some(likes) = stats.like_count {
                context.insert(keys::LIKE_COUNT, likes);
            }
        }

        if let Some(url) = context.get(keys::THUMBNAIL_URL).map(str::to_string) {
            match self.fetch_thumbnail(&url).await {
                Ok(thumbnail) => context.set_thumbnail(thumbnail),
                Err(e) => warn!(url = %url, "Thumbnail unavailable, continuing without it: {}", e),
            }
        }

        info!(
            video_id = %video_id,
            fields = context.len(),
            thumbnail = context.thumbnail().is_some(),
            "Fetched video metadata"
        );
        Ok(context)
    }
}

/// Look up context, degrading to an empty context on failure.
pub async fn fetch_context(provider: &dyn ContextProvider, reference: &VideoReference) -> VideoContext {
    match provider.lookup(reference).await {
        Ok(context) => context,
        Err(e) => {
            warn!(
                provider = provider.name(),
                reference = %reference,
                "Metadata lookup failed, continuing without context: {}", e
            );
            VideoContext::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn youtube_ref() -> VideoReference {
        VideoReference::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap()
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    fn video_json(thumbnail_url: &str) -> serde_json::Value {
        serde_json::json!({
            "items": [{
                "snippet": {
                    "title": "Never Gonna Give You Up",
                    "thumbnails": {"high": {"url": thumbnail_url}}
                }
            }]
        })
    }

    #[tokio::test]
    async fn test_thumbnail_is_downloaded_and_attached() {
        let server = MockServer::start().await;
        let thumb_url = format!("{}/vi/dQw4w9WgXcQ/hqdefault.jpg", server.uri());
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(video_json(&thumb_url)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/vi/dQw4w9WgXcQ/hqdefault.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(jpeg_bytes(48, 36)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = YouTubeDataProvider::with_base_url(server.uri(), "yt-key").unwrap();
        let context = provider.lookup(&youtube_ref()).await.unwrap();

        let thumbnail = context.thumbnail().expect("thumbnail attached");
        assert_eq!(thumbnail.mime_type, "image/jpeg");
        assert_eq!((thumbnail.width, thumbnail.height), (48, 36));
        assert_eq!(context.get(keys::THUMBNAIL_URL), Some(thumb_url.as_str()));
    }

    #[tokio::test]
    async fn test_broken_thumbnail_keeps_text_context() {
        let server = MockServer::start().await;
        let thumb_url = format!("{}/thumb.jpg", server.uri());
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(video_json(&thumb_url)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/thumb.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let provider = YouTubeDataProvider::with_base_url(server.uri(), "yt-key").unwrap();
        let context = provider.lookup(&youtube_ref()).await.unwrap();

        assert!(context.thumbnail().is_none());
        assert_eq!(context.get(keys::TITLE), Some("Never Gonna Give You Up"));
    }

    #[tokio::test]
    async fn test_lookup_maps_snippet_and_statistics() {
        let server = MockServer::start().await;
        let thumb_url = format!("{}/hq.jpg", server.uri());
        Mock::given(method("GET"))
            .and(path("/videos"))
            .and(query_param("id", "dQw4w9WgXcQ"))
            .and(query_param("part", "snippet,statistics"))
            .and(query_param("key", "yt-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{
                    "snippet": {
                        "title": "Never Gonna Give You Up",
                        "description": "Official video",
                        "channelTitle": "Rick Astley",
                        "thumbnails": {"high": {"url": thumb_url}}
                    },
                    "statistics": {"viewCount": "1500000000", "likeCount": "17000000"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = YouTubeDataProvider::with_base_url(server.uri(), "yt-key").unwrap();
        let context = provider.lookup(&youtube_ref()).await.unwrap();

        assert_eq!(context.get(keys::TITLE), Some("Never Gonna Give You Up"));
        assert_eq!(context.get(keys::CHANNEL), Some("Rick Astley"));
        assert_eq!(context.get(keys::VIEW_COUNT), Some("1500000000"));
        assert_eq!(context.get(keys::THUMBNAIL_URL), Some(thumb_url.as_str()));
        assert!(context.has_popularity());
    }

    #[tokio::test]
    async fn test_unknown_video_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&server)
            .await;

        let provider = YouTubeDataProvider::with_base_url(server.uri(), "yt-key").unwrap();
        let err = provider.lookup(&youtube_ref()).await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failure_degrades_to_empty_context() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .mount(&server)
            .await;

        let provider = YouTubeDataProvider::with_base_url(server.uri(), "yt-key").unwrap();
        let context = fetch_context(&provider, &youtube_ref()).await;
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn test_local_reference_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let provider = YouTubeDataProvider::with_base_url(server.uri(), "yt-key").unwrap();
        let reference = VideoReference::parse("/tmp/clip.mp4").unwrap();
        let context = provider.lookup(&reference).await.unwrap();
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn test_no_context_provider() {
        let context = NoContext.lookup(&youtube_ref()).await.unwrap();
        assert!(context.is_empty());
    }
}
