//! Transport-ready frame representation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MIME type of every encoded frame payload.
pub const FRAME_MIME_TYPE: &str = "image/jpeg";

/// A compressed still image, base64-encoded for inline embedding in a
/// JSON request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodedFrame {
    /// Sampling slot of the source frame (0-based, temporal order)
    pub index: usize,
    /// Offset of the source frame in seconds
    pub timestamp: f64,
    /// Width in pixels of the encoded image
    pub width: u32,
    /// Height in pixels of the encoded image
    pub height: u32,
    /// MIME type of the compressed image
    pub mime_type: String,
    /// Base64 (standard alphabet) of the compressed image bytes
    pub data: String,
}
