//! Request and response types shared by all endpoint backends.

use serde::{Deserialize, Serialize};
use vsum_models::{EncodedFrame, GenerationParams};

/// One element of a multimodal prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Inline image as base64 payload
    Image { mime_type: String, data: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(frame: &EncodedFrame) -> Self {
        Self::Image {
            mime_type: frame.mime_type.clone(),
            data: frame.data.clone(),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::Image { .. })
    }

    /// `data:` URI for image parts.
    pub fn data_uri(&self) -> Option<String> {
        match self {
            ContentPart::Image { mime_type, data } => {
                Some(format!("data:{};base64,{}", mime_type, data))
            }
            ContentPart::Text { .. } => None,
        }
    }
}

/// A fully assembled request, constructed fresh per summarization call.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    /// Ordered content: optional thumbnail, leading text, frame images, trailing text
    pub parts: Vec<ContentPart>,
    /// Model identifier understood by the endpoint
    pub model: String,
    pub params: GenerationParams,
}

impl InferenceRequest {
    pub fn image_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_image()).count()
    }
}

/// Generated summary text plus provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Text exactly as returned by the endpoint
    pub text: String,
    pub model: String,
    /// Number of submissions it took, starting at 1
    pub attempts: u32,
}
