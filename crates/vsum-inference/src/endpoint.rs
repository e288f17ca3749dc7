//! The seam between the inference client and a concrete model API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::EndpointError;
use crate::types::InferenceRequest;

/// A remote model that turns one request into generated text.
///
/// Implementations submit exactly once per call and classify every failure
/// with a [`FailureKind`](crate::error::FailureKind); retrying is the
/// client's job.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn name(&self) -> &str;

    async fn generate(&self, request: &InferenceRequest) -> Result<String, EndpointError>;
}

/// Parse a `Retry-After` header given in whole seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Turn a non-success response into a classified error.
pub(crate) async fn error_from_response(response: reqwest::Response) -> EndpointError {
    let status = response.status().as_u16();
    let wait = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    EndpointError::from_http_status(status, &body).with_retry_after(wait)
}
