//! Generation and sampling defaults.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default number of frames sampled per video
pub const DEFAULT_FRAME_COUNT: usize = 5;
/// Default JPEG quality for encoded frames
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default maximum output length in tokens
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Default nucleus sampling cutoff
pub const DEFAULT_TOP_P: f32 = 1.0;

/// Generation parameters sent with every inference request.
///
/// These are operator-tunable constants, fixed for the lifetime of a client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationParams {
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output length in tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}
fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}
fn default_top_p() -> f32 {
    DEFAULT_TOP_P
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
        }
    }
}

impl GenerationParams {
    /// Reject values the endpoints refuse outright.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!("temperature {} outside [0, 2]", self.temperature));
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be at least 1".to_string());
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(format!("top_p {} outside (0, 1]", self.top_p));
        }
        Ok(())
    }
}
