//! Shared data models for the vsum video summarizer.
//!
//! This crate provides Serde-serializable types for:
//! - Video references and YouTube id parsing
//! - Context records supplied by metadata providers
//! - Encoded frames handed to the inference client
//! - Generation parameters and summary reports

pub mod context;
pub mod frame;
pub mod generation;
pub mod reference;
pub mod report;
pub mod run;
pub mod utils;

// Re-export common types
pub use context::VideoContext;
pub use frame::EncodedFrame;
pub use generation::GenerationParams;
pub use reference::{ReferenceError, ReferenceKind, VideoReference};
pub use report::SummaryReport;
pub use run::RunId;
pub use utils::{extract_youtube_id, YoutubeIdError, YoutubeIdResult};
