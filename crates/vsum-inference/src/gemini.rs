//! Gemini `generateContent` endpoint with inline image parts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::endpoint::{error_from_response, ModelEndpoint};
use crate::error::{EndpointError, FailureKind, InferenceError, InferenceResult};
use crate::types::{ContentPart, InferenceRequest};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Gemini API backend.
pub struct GeminiEndpoint {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GeminiEndpoint {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> InferenceResult<Self> {
        Self::with_base_url(GEMINI_BASE_URL, api_key, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> InferenceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn body<'a>(&self, request: &'a InferenceRequest) -> GeminiRequest<'a> {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => Part::Text { text: text.as_str() },
                ContentPart::Image { mime_type, data } => Part::Inline {
                    inline_data: InlineData {
                        mime_type: mime_type.as_str(),
                        data: data.as_str(),
                    },
                },
            })
            .collect();

        GeminiRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: request.params.temperature,
                max_output_tokens: request.params.max_tokens,
                top_p: request.params.top_p,
            },
        }
    }
}

#[async_trait]
impl ModelEndpoint for GeminiEndpoint {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<String, EndpointError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, request.model
        );
        debug!(model = %request.model, images = request.image_count(), "Submitting Gemini request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| EndpointError::from_reqwest(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| EndpointError::from_reqwest(&e))?;

        extract_text(parsed)
    }
}

fn extract_text(response: GeminiResponse) -> Result<String, EndpointError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(EndpointError::new(
            FailureKind::InvalidRequest,
            format!("prompt blocked: {}", reason),
        ));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| EndpointError::malformed("response has no candidates"))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(EndpointError::malformed(format!(
            "candidate has no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vsum_models::GenerationParams;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> InferenceRequest {
        InferenceRequest {
            parts: vec![
                ContentPart::text("look"),
                ContentPart::Image {
                    mime_type: "image/jpeg".to_string(),
                    data: "QUJD".to_string(),
                },
            ],
            model: "gemini-1.5-pro".to_string(),
            params: GenerationParams::default(),
        }
    }

    fn endpoint(server: &MockServer) -> GeminiEndpoint {
        GeminiEndpoint::with_base_url(server.uri(), "g-key", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_generate_content_with_inline_data() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-pro:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"text": "look"},
                        {"inlineData": {"mimeType": "image/jpeg", "data": "QUJD"}}
                    ]
                }],
                "generationConfig": {"maxOutputTokens": 1024}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Video shows X "}, {"text": "then Y."}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = endpoint(&server).generate(&request()).await.unwrap();
        assert_eq!(text, "Video shows X then Y.");
    }

    #[tokio::test]
    async fn test_resource_exhausted_is_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let err = endpoint(&server).generate(&request()).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.message.contains("Quota exceeded"));
    }

    #[tokio::test]
    async fn test_bad_key_is_invalid_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;

        let err = endpoint(&server).generate(&request()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidRequest);
    }

    #[test]
    fn test_blocked_prompt() {
        let response: GeminiResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        let err = extract_text(response).unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidRequest);
    }

    #[test]
    fn test_empty_candidate_is_malformed() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        let err = extract_text(response).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
        assert!(err.message.contains("SAFETY"));
    }
}
