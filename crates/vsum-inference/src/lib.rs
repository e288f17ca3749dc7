//! Multimodal model client for video summaries.
//!
//! This crate provides:
//! - Prompt assembly from encoded frames and optional video context
//! - Chat-completions (streamed or buffered) and Gemini endpoint backends
//! - Structured failure classification with rate-limit detection
//! - Bounded exponential backoff retried only on rate limiting

pub mod chat;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod gemini;
pub mod metrics;
pub mod prompt;
pub mod retry;
pub mod types;

pub use chat::ChatEndpoint;
pub use client::{CallState, InferenceClient};
pub use config::{Backend, EndpointConfig};
pub use endpoint::ModelEndpoint;
pub use error::{EndpointError, FailureKind, InferenceError, InferenceResult};
pub use gemini::GeminiEndpoint;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper, MAX_ATTEMPTS};
pub use types::{ContentPart, InferenceRequest, Summary};
