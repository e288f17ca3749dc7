//! Summary report model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::context::VideoContext;
use crate::reference::VideoReference;

/// Final output of a successful pipeline run, with provenance.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SummaryReport {
    /// Source video
    pub reference: VideoReference,
    /// Generated summary, verbatim
    pub summary: String,
    /// When the summary was produced
    pub generated_at: DateTime<Utc>,
    /// Model that produced the summary
    pub model: String,
    /// Frames actually sent to the model
    pub frames_used: usize,
    /// Frames requested from the sampler
    pub frames_requested: usize,
    /// Context supplied alongside the frames
    #[serde(default)]
    pub context: VideoContext,
}

impl SummaryReport {
    /// True when some sampled timestamps could not be decoded.
    pub fn is_partial(&self) -> bool {
        self.frames_used < self.frames_requested
    }
}
