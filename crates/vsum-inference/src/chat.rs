//! Chat-completions endpoint (OpenAI wire format, as served by Groq and
//! most gateways).
//!
//! Images travel as `data:` URIs inside `image_url` content parts. Responses
//! are either buffered JSON or a server-sent event stream terminated by
//! `data: [DONE]`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::endpoint::{error_from_response, ModelEndpoint};
use crate::error::{EndpointError, InferenceError, InferenceResult};
use crate::types::{ContentPart, InferenceRequest};

/// Groq's OpenAI-compatible API root.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

const STREAM_DONE: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ChatContent<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContent<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Chat-completions backend.
pub struct ChatEndpoint {
    http: Client,
    base_url: String,
    api_key: String,
    stream: bool,
    name: &'static str,
}

impl ChatEndpoint {
    /// Create a streaming endpoint rooted at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> InferenceResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            stream: true,
            name: "chat",
        })
    }

    /// Groq's hosted endpoint.
    pub fn groq(api_key: impl Into<String>, timeout: Duration) -> InferenceResult<Self> {
        Self::new(GROQ_BASE_URL, api_key, timeout)
    }

    /// An operator-run relay speaking the same wire format, buffered.
    pub fn gateway(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> InferenceResult<Self> {
        let mut endpoint = Self::new(base_url, api_key, timeout)?;
        endpoint.stream = false;
        endpoint.name = "gateway";
        Ok(endpoint)
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    fn body<'a>(&self, request: &'a InferenceRequest) -> ChatRequest<'a> {
        let content = request
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => ChatContent::Text { text: text.as_str() },
                ContentPart::Image { .. } => ChatContent::ImageUrl {
                    image_url: ImageUrl {
                        url: part.data_uri().unwrap_or_default(),
                    },
                },
            })
            .collect();

        ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            top_p: request.params.top_p,
            stream: self.stream,
        }
    }

    async fn read_buffered(&self, response: reqwest::Response) -> Result<String, EndpointError> {
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EndpointError::from_reqwest(&e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EndpointError::malformed("response has no message content"))
    }

    async fn read_stream(&self, response: reqwest::Response) -> Result<String, EndpointError> {
        let mut reader = SseReader::default();
        let mut bytes = response.bytes_stream();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| {
                EndpointError::incomplete(format!("stream interrupted: {}", e))
            })?;
            reader.feed(&chunk)?;
            if reader.done {
                break;
            }
        }
        reader.finish()
    }
}

#[async_trait]
impl ModelEndpoint for ChatEndpoint {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<String, EndpointError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            url = %url,
            model = %request.model,
            images = request.image_count(),
            stream = self.stream,
            "Submitting chat completion"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| EndpointError::from_reqwest(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        if self.stream {
            self.read_stream(response).await
        } else {
            self.read_buffered(response).await
        }
    }
}

/// Incremental server-sent event parser for chat-completion chunks.
#[derive(Debug, Default)]
struct SseReader {
    pending: Vec<u8>,
    text: String,
    done: bool,
    finished: bool,
}

impl SseReader {
    /// Consume raw bytes; complete lines are parsed, the remainder is kept.
    fn feed(&mut self, bytes: &[u8]) -> Result<(), EndpointError> {
        self.pending.extend_from_slice(bytes);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.line(line.trim())?;
            if self.done {
                break;
            }
        }
        Ok(())
    }

    fn line(&mut self, line: &str) -> Result<(), EndpointError> {
        let Some(payload) = line.strip_prefix("data:") else {
            // Comments, event names and blank separators.
            return Ok(());
        };
        let payload = payload.trim();

        if payload == STREAM_DONE {
            self.done = true;
            return Ok(());
        }

        let value: Value = serde_json::from_str(payload)
            .map_err(|e| EndpointError::malformed(format!("bad stream chunk: {}", e)))?;

        if value.get("error").is_some() {
            return Err(EndpointError::from_error_payload(payload));
        }

        let chunk: ChatChunk = serde_json::from_value(value)
            .map_err(|e| EndpointError::malformed(format!("bad stream chunk: {}", e)))?;

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                self.text.push_str(&content);
            }
            if choice.finish_reason.is_some() {
                self.finished = true;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<String, EndpointError> {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.line(String::from_utf8_lossy(&rest).trim())?;
        }

        if self.done || self.finished {
            Ok(self.text)
        } else {
            Err(EndpointError::incomplete(
                "stream ended before the end-of-response marker",
            ))
        }
    }
}
