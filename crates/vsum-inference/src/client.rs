//! Inference client: prompt assembly plus rate-limit aware submission.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use vsum_models::{EncodedFrame, GenerationParams, VideoContext};

use crate::endpoint::ModelEndpoint;
use crate::error::{InferenceError, InferenceResult};
use crate::metrics::{record_attempt, record_backoff};
use crate::prompt::build_request;
use crate::retry::{jitter, RetryPolicy, Sleeper, TokioSleeper};
use crate::types::{InferenceRequest, Summary};

/// Lifecycle of a single summarization call.
///
/// `Succeeded` and `Failed` are terminal; `RateLimited` always leads back to
/// `Submitted` or to `Failed` once attempts run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Pending,
    Submitted,
    RateLimited,
    Succeeded,
    Failed,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Pending => "pending",
            CallState::Submitted => "submitted",
            CallState::RateLimited => "rate_limited",
            CallState::Succeeded => "succeeded",
            CallState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Succeeded | CallState::Failed)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns encoded frames plus context into a summary.
pub struct InferenceClient {
    endpoint: Arc<dyn ModelEndpoint>,
    model: String,
    params: GenerationParams,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl InferenceClient {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
            params: GenerationParams::default(),
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            cancel_rx: None,
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Honor a cancellation signal before each submission and around each
    /// backoff wait.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend(&self) -> &str {
        self.endpoint.name()
    }

    /// Summarize `frames` (in temporal order) with optional `context`.
    pub async fn summarize(
        &self,
        frames: &[EncodedFrame],
        context: &VideoContext,
    ) -> InferenceResult<Summary> {
        if frames.is_empty() {
            return Err(InferenceError::NoFrames);
        }

        let request = build_request(frames, context, &self.model, &self.params);
        info!(
            backend = self.backend(),
            model = %self.model,
            frames = frames.len(),
            context_fields = context.len(),
            "Requesting summary"
        );

        self.submit(&request).await
    }

    /// Submit an assembled request, retrying only on rate limiting.
    pub async fn submit(&self, request: &InferenceRequest) -> InferenceResult<Summary> {
        let backend = self.endpoint.name();
        let mut state = CallState::Pending;
        let mut attempt: u32 = 0;

        loop {
            self.check_cancelled(&mut state)?;
            transition(&mut state, CallState::Submitted, attempt);

            let started = Instant::now();
            let result = self.endpoint.generate(request).await;
            let latency = started.elapsed();

            match result {
                Ok(text) => {
                    record_attempt(backend, "success", latency);
                    transition(&mut state, CallState::Succeeded, attempt);
                    info!(
                        backend,
                        attempts = attempt + 1,
                        chars = text.len(),
                        "Summary received"
                    );
                    return Ok(Summary {
                        text,
                        model: request.model.clone(),
                        attempts: attempt + 1,
                    });
                }
                Err(e) if e.is_rate_limited() => {
                    record_attempt(backend, e.kind.as_str(), latency);
                    transition(&mut state, CallState::RateLimited, attempt);

                    if attempt + 1 >= self.policy.max_attempts {
                        warn!(backend, attempts = attempt + 1, "Rate limited on every attempt: {}", e);
                        transition(&mut state, CallState::Failed, attempt);
                        return Err(InferenceError::RetriesExhausted {
                            attempts: attempt + 1,
                            last: e,
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt, jitter());
                    warn!(
                        backend,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        retry_after_secs = e.retry_after.map(|d| d.as_secs()),
                        "Rate limited, backing off: {}",
                        e
                    );
                    record_backoff(backend, delay);

                    self.check_cancelled(&mut state)?;
                    self.sleeper.sleep(delay).await;
                    self.check_cancelled(&mut state)?;

                    attempt += 1;
                }
                Err(e) => {
                    record_attempt(backend, e.kind.as_str(), latency);
                    warn!(backend, attempt = attempt + 1, kind = %e.kind, "Inference failed: {}", e);
                    transition(&mut state, CallState::Failed, attempt);
                    return Err(InferenceError::Endpoint(e));
                }
            }
        }
    }

    fn check_cancelled(&self, state: &mut CallState) -> InferenceResult<()> {
        let cancelled = self
            .cancel_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false);

        if cancelled {
            info!(state = %state, "Inference cancelled");
            *state = CallState::Failed;
            return Err(InferenceError::Cancelled);
        }
        Ok(())
    }
}

fn transition(state: &mut CallState, next: CallState, attempt: u32) {
    debug!(from = %state, to = %next, attempt = attempt + 1, "Inference state change");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EndpointError, FailureKind};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Endpoint that replays a fixed script of outcomes.
    struct ScriptedEndpoint {
        script: Mutex<VecDeque<Result<String, EndpointError>>>,
        calls: Mutex<u32>,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    impl ScriptedEndpoint {
        fn new(script: Vec<Result<String, EndpointError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn always_rate_limited() -> Arc<Self> {
            Self::new((0..20).map(|_| Err(EndpointError::rate_limited("429"))).collect())
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ModelEndpoint for ScriptedEndpoint {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &InferenceRequest) -> Result<String, EndpointError> {
            *self.calls.lock().unwrap() += 1;
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EndpointError::malformed("script exhausted")))
        }
    }

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn frames(n: usize) -> Vec<EncodedFrame> {
        (0..n)
            .map(|i| EncodedFrame {
                index: i,
                timestamp: i as f64 * 20.0,
                width: 2,
                height: 2,
                mime_type: "image/jpeg".to_string(),
                data: format!("frame{}", i),
            })
            .collect()
    }

    fn client(
        endpoint: Arc<ScriptedEndpoint>,
        sleeper: Arc<RecordingSleeper>,
    ) -> InferenceClient {
        InferenceClient::new(endpoint, "test-model").with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_returns_text_verbatim() {
        let endpoint = ScriptedEndpoint::new(vec![Ok("Video shows X then Y.".to_string())]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let summary = client(endpoint.clone(), sleeper.clone())
            .summarize(&frames(5), &VideoContext::new())
            .await
            .unwrap();

        assert_eq!(summary.text, "Video shows X then Y.");
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.model, "test-model");
        assert_eq!(endpoint.calls(), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());

        let sent = endpoint.requests.lock().unwrap();
        assert_eq!(sent[0].image_count(), 5);
    }

    #[tokio::test]
    async fn test_rate_limited_twice_then_success() {
        let endpoint = ScriptedEndpoint::new(vec![
            Err(EndpointError::rate_limited("429")),
            Err(EndpointError::rate_limited("429")),
            Ok("third time lucky".to_string()),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let summary = client(endpoint.clone(), sleeper.clone())
            .summarize(&frames(2), &VideoContext::new())
            .await
            .unwrap();

        assert_eq!(summary.text, "third time lucky");
        assert_eq!(summary.attempts, 3);
        assert_eq!(endpoint.calls(), 3);

        let delays = sleeper.delays.lock().unwrap().clone();
        assert_eq!(delays.len(), 2);
        assert!(delays[0] >= Duration::from_secs(1) && delays[0] < Duration::from_secs(2));
        assert!(delays[1] >= Duration::from_secs(2) && delays[1] < Duration::from_secs(3));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_always_rate_limited_fails_after_exactly_five_attempts() {
        let endpoint = ScriptedEndpoint::always_rate_limited();
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = client(endpoint.clone(), sleeper.clone())
            .summarize(&frames(1), &VideoContext::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InferenceError::RetriesExhausted { attempts: 5, .. }
        ));
        assert!(err.to_string().contains("max retry attempts reached"));
        assert_eq!(endpoint.calls(), 5);

        let delays = sleeper.delays.lock().unwrap().clone();
        assert_eq!(delays.len(), 4, "no sleep after the final attempt");
        for (n, d) in delays.iter().enumerate() {
            let floor = Duration::from_secs(1 << n);
            assert!(*d >= floor && *d < floor + Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn test_non_rate_limit_failure_is_not_retried() {
        for kind in [
            FailureKind::Unauthorized,
            FailureKind::InvalidRequest,
            FailureKind::Server,
            FailureKind::Transport,
            FailureKind::IncompleteResponse,
        ] {
            let endpoint = ScriptedEndpoint::new(vec![
                Err(EndpointError::new(kind, "nope")),
                Ok("never reached".to_string()),
            ]);
            let sleeper = Arc::new(RecordingSleeper::default());

            let err = client(endpoint.clone(), sleeper.clone())
                .summarize(&frames(1), &VideoContext::new())
                .await
                .unwrap_err();

            assert_eq!(err.failure_kind(), Some(kind));
            assert!(matches!(err, InferenceError::Endpoint(_)));
            assert_eq!(endpoint.calls(), 1);
            assert!(sleeper.delays.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_empty_frames_are_rejected_before_submission() {
        let endpoint = ScriptedEndpoint::new(vec![Ok("x".to_string())]);
        let err = client(endpoint.clone(), Arc::new(RecordingSleeper::default()))
            .summarize(&[], &VideoContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::NoFrames));
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_submission() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let endpoint = ScriptedEndpoint::new(vec![Ok("x".to_string())]);
        let err = client(endpoint.clone(), Arc::new(RecordingSleeper::default()))
            .with_cancel(rx)
            .summarize(&frames(1), &VideoContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::Cancelled));
        assert_eq!(endpoint.calls(), 0);
    }

    /// Sleeper that flips the cancel flag while "sleeping".
    struct CancellingSleeper {
        tx: watch::Sender<bool>,
    }

    #[async_trait]
    impl Sleeper for CancellingSleeper {
        async fn sleep(&self, _duration: Duration) {
            let _ = self.tx.send(true);
        }
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff_stops_retrying() {
        let (tx, rx) = watch::channel(false);
        let endpoint = ScriptedEndpoint::always_rate_limited();

        let err = InferenceClient::new(endpoint.clone(), "m")
            .with_sleeper(Arc::new(CancellingSleeper { tx }))
            .with_cancel(rx)
            .summarize(&frames(1), &VideoContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::Cancelled));
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_custom_attempt_budget() {
        let endpoint = ScriptedEndpoint::always_rate_limited();
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = client(endpoint.clone(), sleeper.clone())
            .with_policy(RetryPolicy::default().with_max_attempts(2))
            .summarize(&frames(1), &VideoContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(sleeper.delays.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_call_state_terminality() {
        assert!(CallState::Succeeded.is_terminal());
        assert!(CallState::Failed.is_terminal());
        assert!(!CallState::RateLimited.is_terminal());
        assert_eq!(CallState::RateLimited.to_string(), "rate_limited");
    }
}
