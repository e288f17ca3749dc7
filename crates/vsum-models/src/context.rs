//! Context records supplied by metadata providers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::frame::EncodedFrame;

/// Well-known context keys produced by the platform metadata provider.
pub mod keys {
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const VIEW_COUNT: &str = "view_count";
    pub const LIKE_COUNT: &str = "like_count";
    pub const THUMBNAIL_URL: &str = "thumbnail_url";
    pub const CHANNEL: &str = "channel";
}

/// Opaque, ordered key/value record describing a video.
///
/// The pipeline never interprets the values; they are interpolated into
/// the instruction text in insertion order. A thumbnail, when present,
/// travels alongside as an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoContext {
    entries: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EncodedFrame>,
}

impl VideoContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any existing value for the same key.
    /// Blank values are ignored.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert an entry in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: EncodedFrame) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn set_thumbnail(&mut self, thumbnail: EncodedFrame) {
        self.thumbnail = Some(thumbnail);
    }

    /// The video's thumbnail image, if one was fetched.
    pub fn thumbnail(&self) -> Option<&EncodedFrame> {
        self.thumbnail.as_ref()
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the record carries view or like statistics.
    pub fn has_popularity(&self) -> bool {
        self.get(keys::VIEW_COUNT).is_some() || self.get(keys::LIKE_COUNT).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_and_replace() {
        let ctx = VideoContext::new()
            .with(keys::TITLE, "First")
            .with(keys::VIEW_COUNT, "10")
            .with(keys::TITLE, "Second");

        let entries: Vec<_> = ctx.iter().collect();
        assert_eq!(entries, vec![("title", "Second"), ("view_count", "10")]);
        assert!(ctx.has_popularity());
    }

    #[test]
    fn test_thumbnail_is_not_a_text_entry() {
        let thumb = EncodedFrame {
            index: 0,
            timestamp: 0.0,
            width: 4,
            height: 3,
            mime_type: "image/jpeg".to_string(),
            data: "QUJD".to_string(),
        };
        let ctx = VideoContext::new().with(keys::TITLE, "t").with_thumbnail(thumb);

        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.thumbnail().map(|t| t.width), Some(4));
        assert!(VideoContext::new().thumbnail().is_none());
    }

    #[test]
    fn test_blank_values_ignored() {
        let ctx = VideoContext::new().with(keys::DESCRIPTION, "  ");
        assert!(ctx.is_empty());
        assert!(!ctx.has_popularity());
    }
}
