//! Pipeline error types.

use std::fmt;

use thiserror::Error;
use vsum_inference::InferenceError;
use vsum_media::{MediaError, MediaStage};

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Stage of a run, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Acquisition,
    Sampling,
    Encoding,
    Inference,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configuration => "configuration",
            Stage::Acquisition => "acquisition",
            Stage::Sampling => "sampling",
            Stage::Encoding => "encoding",
            Stage::Inference => "inference",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid or missing startup configuration.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Acquisition failed: {0}")]
    Acquisition(MediaError),

    #[error("Sampling failed: {0}")]
    Sampling(MediaError),

    #[error("Sampling produced no frames: {0}")]
    EmptyResult(MediaError),

    #[error("Encoding failed: {0}")]
    Encoding(MediaError),

    #[error("Inference failed: {0}")]
    Inference(InferenceError),

    #[error("Report failed: {0}")]
    Report(String),

    #[error("Run cancelled during {0}")]
    Cancelled(Stage),
}

impl PipelineError {
    pub fn report(msg: impl Into<String>) -> Self {
        Self::Report(msg.into())
    }

    /// Stage the failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Configuration(_) => Stage::Configuration,
            PipelineError::Acquisition(_) => Stage::Acquisition,
            PipelineError::Sampling(_) | PipelineError::EmptyResult(_) => Stage::Sampling,
            PipelineError::Encoding(_) => Stage::Encoding,
            PipelineError::Inference(_) => Stage::Inference,
            PipelineError::Report(_) => Stage::Report,
            PipelineError::Cancelled(stage) => *stage,
        }
    }

    /// Short machine-friendly error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "ConfigurationError",
            PipelineError::Acquisition(_) => "AcquisitionError",
            PipelineError::Sampling(_) => "SamplingError",
            PipelineError::EmptyResult(_) => "EmptyResultError",
            PipelineError::Encoding(_) => "EncodingError",
            PipelineError::Inference(_) => "InferenceError",
            PipelineError::Report(_) => "ReportError",
            PipelineError::Cancelled(_) => "Cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_))
    }

    /// Attribute a media error raised while `stage` was running.
    pub fn from_media(stage: Stage, err: MediaError) -> Self {
        if matches!(err, MediaError::Cancelled) {
            return Self::Cancelled(stage);
        }
        if err.is_empty_result() {
            return Self::EmptyResult(err);
        }
        match err.stage() {
            MediaStage::Acquisition => Self::Acquisition(err),
            MediaStage::Sampling => Self::Sampling(err),
            MediaStage::Encoding => Self::Encoding(err),
            MediaStage::Tooling => match stage {
                Stage::Acquisition => Self::Acquisition(err),
                Stage::Encoding => Self::Encoding(err),
                _ => Self::Sampling(err),
            },
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.0)
    }
}

impl From<InferenceError> for PipelineError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Config(msg) => Self::Configuration(msg),
            InferenceError::Cancelled => Self::Cancelled(Stage::Inference),
            other => Self::Inference(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsum_inference::EndpointError;

    #[test]
    fn test_media_errors_map_to_stages() {
        let err = PipelineError::from_media(
            Stage::Acquisition,
            MediaError::acquisition("x", "download failed"),
        );
        assert_eq!(err.stage(), Stage::Acquisition);
        assert_eq!(err.kind(), "AcquisitionError");

        let err = PipelineError::from_media(Stage::Sampling, MediaError::sampling("unreadable"));
        assert_eq!(err.kind(), "SamplingError");

        let err = PipelineError::from_media(Stage::Sampling, MediaError::EmptyResult { requested: 5 });
        assert_eq!(err.kind(), "EmptyResultError");
        assert_eq!(err.stage(), Stage::Sampling);

        let err = PipelineError::from_media(Stage::Encoding, MediaError::encoding(2, "bad"));
        assert_eq!(err.stage(), Stage::Encoding);

        let err = PipelineError::from_media(Stage::Sampling, MediaError::Cancelled);
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_tooling_errors_follow_running_stage() {
        let err = PipelineError::from_media(Stage::Acquisition, MediaError::FfprobeNotFound);
        assert_eq!(err.stage(), Stage::Acquisition);
        let err = PipelineError::from_media(Stage::Sampling, MediaError::FfmpegNotFound);
        assert_eq!(err.stage(), Stage::Sampling);
    }

    #[test]
    fn test_inference_errors() {
        let err: PipelineError = InferenceError::config("INFERENCE_API_KEY not set").into();
        assert_eq!(err.stage(), Stage::Configuration);

        let err: PipelineError = InferenceError::Endpoint(EndpointError::transport("reset")).into();
        assert_eq!(err.stage(), Stage::Inference);
        assert!(err.to_string().contains("reset"));

        let err: PipelineError = InferenceError::Cancelled.into();
        assert!(matches!(err, PipelineError::Cancelled(Stage::Inference)));
    }
}
