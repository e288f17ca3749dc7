//! The summarization pipeline: acquire, sample, encode, infer.
//!
//! Stages run strictly in order. Each one either hands its output to the
//! next or stops the run with a [`PipelineError`] naming the stage.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use vsum_inference::InferenceClient;
use vsum_media::{
    FfmpegRunner, FrameEncoder, FrameSampler, MediaAcquirer, SampledFrames, YtDlpFetcher,
};
use vsum_models::{SummaryReport, VideoContext, VideoReference};

use crate::config::RunConfig;
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::logging::RunLogger;
use crate::metadata::{fetch_context, ContextProvider, NoContext};
use crate::report::ReportWriter;

/// A finished run and where its report landed, if one was written.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: SummaryReport,
    pub report_path: Option<PathBuf>,
}

pub struct Pipeline {
    acquirer: MediaAcquirer,
    sampler: FrameSampler,
    encoder: FrameEncoder,
    context: Arc<dyn ContextProvider>,
    client: InferenceClient,
    frame_count: usize,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    /// Pipeline with default media settings and no context provider.
    pub fn new(acquirer: MediaAcquirer, client: InferenceClient) -> Self {
        Self {
            acquirer,
            sampler: FrameSampler::default(),
            encoder: FrameEncoder::default(),
            context: Arc::new(NoContext),
            client,
            frame_count: vsum_models::generation::DEFAULT_FRAME_COUNT,
            cancel_rx: None,
        }
    }

    /// Wire the media stages from a run configuration.
    pub fn from_config(
        config: &RunConfig,
        client: InferenceClient,
        cancel_rx: Option<watch::Receiver<bool>>,
    ) -> Self {
        let mut fetcher = YtDlpFetcher::new().with_timeout(config.download_timeout_secs);
        if let Some(cookies) = &config.cookies {
            fetcher = fetcher.with_cookies(cookies.clone());
        }

        let mut runner = FfmpegRunner::new().with_timeout(config.decode_timeout_secs);
        if let Some(rx) = &cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }

        let mut pipeline = Self::new(
            MediaAcquirer::with_fetcher(&config.work_dir, Arc::new(fetcher)),
            client,
        )
        .with_sampler(FrameSampler::new(config.shortfall).with_runner(runner))
        .with_encoder(
            FrameEncoder::new()
                .with_quality(config.jpeg_quality)
                .with_max_dimension(config.max_dimension),
        )
        .with_frame_count(config.frame_count);

        if let Some(rx) = cancel_rx {
            pipeline = pipeline.with_cancel(rx);
        }
        pipeline
    }

    pub fn with_sampler(mut self, sampler: FrameSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_encoder(mut self, encoder: FrameEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = provider;
        self
    }

    pub fn with_frame_count(mut self, count: usize) -> Self {
        self.frame_count = count;
        self
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn check_cancelled(&self, stage: Stage) -> PipelineResult<()> {
        if let Some(rx) = &self.cancel_rx {
            if *rx.borrow() {
                return Err(PipelineError::Cancelled(stage));
            }
        }
        Ok(())
    }

    /// Run every stage for `reference` and return the finished report.
    pub async fn run(
        &self,
        reference: &VideoReference,
        logger: &RunLogger,
    ) -> PipelineResult<SummaryReport> {
        if self.frame_count == 0 {
            return Err(PipelineError::Configuration(
                "frame count must be at least 1".to_string(),
            ));
        }

        logger.log_start(&format!("{} frames requested", self.frame_count));

        let context = fetch_context(self.context.as_ref(), reference).await;

        self.check_cancelled(Stage::Acquisition)?;
        logger.log_stage(Stage::Acquisition.as_str(), "Acquiring media");
        let handle = self
            .acquirer
            .acquire(reference)
            .await
            .map_err(|e| PipelineError::from_media(Stage::Acquisition, e))?;

        if let Err(e) = self.check_cancelled(Stage::Sampling) {
            release(handle, logger);
            return Err(e);
        }
        logger.log_stage(
            Stage::Sampling.as_str(),
            &format!("Sampling {} frames over {:.1}s", self.frame_count, handle.duration()),
        );
        let sampled = self.sampler.sample(&handle, self.frame_count).await;

        // Pixels are in memory now; the media file is no longer needed.
        release(handle, logger);
        let sampled = sampled.map_err(|e| PipelineError::from_media(Stage::Sampling, e))?;

        if !sampled.is_complete() {
            logger.log_warning(&format!(
                "{} of {} frames decoded; skipped slots {:?}",
                sampled.len(),
                sampled.requested,
                sampled.skipped
            ));
        }

        self.summarize_frames(reference, &sampled, context, logger)
            .await
    }

    /// Run every stage, then persist the report through `writer`. A failed
    /// run writes nothing.
    pub async fn run_and_report(
        &self,
        reference: &VideoReference,
        logger: &RunLogger,
        writer: Option<&dyn ReportWriter>,
    ) -> PipelineResult<RunOutcome> {
        let report = self.run(reference, logger).await?;

        let report_path = match writer {
            Some(writer) => Some(writer.write(&report)?),
            None => None,
        };

        Ok(RunOutcome {
            report,
            report_path,
        })
    }

    /// Encode sampled frames and ask the model for a summary.
    pub async fn summarize_frames(
        &self,
        reference: &VideoReference,
        sampled: &SampledFrames,
        context: VideoContext,
        logger: &RunLogger,
    ) -> PipelineResult<SummaryReport> {
        self.check_cancelled(Stage::Encoding)?;
        logger.log_stage(Stage::Encoding.as_str(), "Encoding frames");
        let encoded = self
            .encoder
            .encode_all(&sampled.frames)
            .map_err(|e| PipelineError::from_media(Stage::Encoding, e))?;

        self.check_cancelled(Stage::Inference)?;
        logger.log_stage(
            Stage::Inference.as_str(),
            &format!("Requesting summary from {}", self.client.backend()),
        );
        let summary = self.client.summarize(&encoded, &context).await?;

        logger.log_completion(&format!(
            "summary of {} chars after {} attempt(s)",
            summary.text.len(),
            summary.attempts
        ));

        Ok(SummaryReport {
            reference: reference.clone(),
            summary: summary.text,
            generated_at: Utc::now(),
            model: summary.model,
            frames_used: encoded.len(),
            frames_requested: sampled.requested,
            context,
        })
    }
}

fn release(handle: vsum_media::MediaHandle, logger: &RunLogger) {
    if let Err(e) = handle.release() {
        logger.log_warning(&format!("Failed to clean up media workspace: {}", e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vsum_inference::{EndpointError, InferenceRequest, ModelEndpoint};
    use vsum_models::RunId;

    struct UnreachableEndpoint;

    #[async_trait]
    impl ModelEndpoint for UnreachableEndpoint {
        fn name(&self) -> &str {
            "unreachable"
        }

        async fn generate(&self, _request: &InferenceRequest) -> Result<String, EndpointError> {
            panic!("inference must not run when acquisition fails");
        }
    }

    fn pipeline(work_dir: &std::path::Path) -> Pipeline {
        let client = InferenceClient::new(Arc::new(UnreachableEndpoint), "test-model");
        Pipeline::new(MediaAcquirer::new(work_dir), client)
    }

    #[tokio::test]
    async fn test_missing_local_file_is_acquisition_error() {
        let work = tempfile::tempdir().unwrap();
        let reference = VideoReference::parse("/nonexistent/vsum/clip.mp4").unwrap();
        let logger = RunLogger::new(&RunId::new(), reference.as_str());

        let err = pipeline(work.path()).run(&reference, &logger).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Acquisition);
        assert_eq!(err.kind(), "AcquisitionError");
    }

    #[tokio::test]
    async fn test_cancelled_before_acquisition() {
        let work = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let reference = VideoReference::parse("/nonexistent/vsum/clip.mp4").unwrap();
        let logger = RunLogger::new(&RunId::new(), reference.as_str());
        let err = pipeline(work.path())
            .with_cancel(rx)
            .run(&reference, &logger)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled(Stage::Acquisition)));
    }

    #[tokio::test]
    async fn test_zero_frames_is_configuration_error() {
        let work = tempfile::tempdir().unwrap();
        let reference = VideoReference::parse("/nonexistent/vsum/clip.mp4").unwrap();
        let logger = RunLogger::new(&RunId::new(), reference.as_str());

        let err = pipeline(work.path())
            .with_frame_count(0)
            .run(&reference, &logger)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Configuration);
    }
}
