//! Prompt assembly.
//!
//! The request is laid out as a leading instruction (with any video context
//! and the sampled timestamps), one image part per frame in the order given,
//! and a trailing synthesis instruction. When the context carries a
//! thumbnail it goes first, under its own label.

use std::fmt::Write;

use vsum_models::{EncodedFrame, GenerationParams, VideoContext};

use crate::types::{ContentPart, InferenceRequest};

pub const LEADING_INSTRUCTION: &str =
    "Analyze the following video frames and provide a concise summary of the video content.";

pub const SYNTHESIS_INSTRUCTION: &str =
    "Based on these key frames, summarize the main points and content of the video.";

pub const THUMBNAIL_LABEL: &str = "Video thumbnail:";

const THUMBNAIL_INSTRUCTION: &str = "Also interpret the thumbnail image, and give a hypothesis \
     about the video content based on the title, description and thumbnail.";

const POPULARITY_INSTRUCTION: &str =
    "Also include a short remark on the video's popularity based on its views and likes.";

/// Build the request for `frames` with `context` interpolated into the text.
pub fn build_request(
    frames: &[EncodedFrame],
    context: &VideoContext,
    model: &str,
    params: &GenerationParams,
) -> InferenceRequest {
    let mut parts = Vec::with_capacity(frames.len() + 4);
    if let Some(thumbnail) = context.thumbnail() {
        parts.push(ContentPart::text(THUMBNAIL_LABEL));
        parts.push(ContentPart::image(thumbnail));
    }
    parts.push(ContentPart::text(leading_text(frames, context)));
    parts.extend(frames.iter().map(ContentPart::image));
    parts.push(ContentPart::text(trailing_text(context)));

    InferenceRequest {
        parts,
        model: model.to_string(),
        params: *params,
    }
}

fn leading_text(frames: &[EncodedFrame], context: &VideoContext) -> String {
    let mut text = String::from(LEADING_INSTRUCTION);

    if !context.is_empty() {
        text.push_str("\n\nVideo information:");
        for (key, value) in context.iter() {
            let _ = write!(text, "\n- {}: {}", label(key), value);
        }
    }

    let stamps: Vec<String> = frames
        .iter()
        .map(|f| format!("{:.1}s", f.timestamp))
        .collect();
    let _ = write!(
        text,
        "\n\nThe {} frames below are in chronological order, taken at: {}.",
        frames.len(),
        stamps.join(", ")
    );

    text
}

fn trailing_text(context: &VideoContext) -> String {
    let mut text = String::from(SYNTHESIS_INSTRUCTION);
    if context.thumbnail().is_some() {
        text.push(' ');
        text.push_str(THUMBNAIL_INSTRUCTION);
    }
    if context.has_popularity() {
        text.push(' ');
        text.push_str(POPULARITY_INSTRUCTION);
    }
    text
}

/// `view_count` -> `View count`
fn label(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
