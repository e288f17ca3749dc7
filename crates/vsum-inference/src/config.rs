//! Endpoint configuration.
//!
//! The backend, credential and generation parameters are read once at
//! startup. A missing credential is a configuration error raised before any
//! pipeline work begins.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use vsum_models::GenerationParams;

use crate::chat::{ChatEndpoint, GROQ_BASE_URL};
use crate::client::InferenceClient;
use crate::endpoint::ModelEndpoint;
use crate::error::{InferenceError, InferenceResult};
use crate::gemini::{GeminiEndpoint, GEMINI_BASE_URL};
use crate::retry::RetryPolicy;

/// Generic credential variable, checked before backend-specific ones.
pub const API_KEY_VAR: &str = "INFERENCE_API_KEY";

/// Which wire protocol to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Direct chat-completions endpoint (Groq by default)
    #[default]
    Chat,
    /// Gemini generateContent
    Gemini,
    /// Operator-run chat-completions relay
    Gateway,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Chat => "chat",
            Backend::Gemini => "gemini",
            Backend::Gateway => "gateway",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Backend::Chat | Backend::Gateway => "llama-3.2-90b-vision-preview",
            Backend::Gemini => "gemini-1.5-pro",
        }
    }

    /// Backend-specific credential variable, if any.
    pub fn key_var(&self) -> Option<&'static str> {
        match self {
            Backend::Chat => Some("GROQ_API_KEY"),
            Backend::Gemini => Some("GEMINI_API_KEY"),
            Backend::Gateway => None,
        }
    }

    fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Backend::Chat => Some(GROQ_BASE_URL),
            Backend::Gemini => Some(GEMINI_BASE_URL),
            Backend::Gateway => None,
        }
    }
}

impl FromStr for Backend {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "groq" | "openai" => Ok(Backend::Chat),
            "gemini" | "google" => Ok(Backend::Gemini),
            "gateway" | "relay" => Ok(Backend::Gateway),
            other => Err(InferenceError::config(format!(
                "unknown inference backend '{}' (expected chat, gemini or gateway)",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to build an [`InferenceClient`].
#[derive(Clone)]
pub struct EndpointConfig {
    pub backend: Backend,
    pub api_key: String,
    /// API root; `None` uses the backend's public endpoint
    pub base_url: Option<String>,
    pub model: String,
    /// Stream chat-completion responses (ignored by Gemini)
    pub stream: bool,
    /// Per-request timeout
    pub timeout: Duration,
    pub params: GenerationParams,
    pub retry: RetryPolicy,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("backend", &self.backend)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("stream", &self.stream)
            .field("timeout", &self.timeout)
            .field("params", &self.params)
            .field("retry", &self.retry)
            .finish()
    }
}

impl EndpointConfig {
    /// Create config from environment variables.
    pub fn from_env() -> InferenceResult<Self> {
        let backend: Backend = match non_empty_var("INFERENCE_BACKEND") {
            Some(name) => name.parse()?,
            None => Backend::default(),
        };

        let api_key = non_empty_var(API_KEY_VAR)
            .or_else(|| backend.key_var().and_then(non_empty_var))
            .ok_or_else(|| {
                let hint = backend
                    .key_var()
                    .map(|v| format!(" or {}", v))
                    .unwrap_or_default();
                InferenceError::config(format!("{}{} not set", API_KEY_VAR, hint))
            })?;

        let base_url = non_empty_var("INFERENCE_BASE_URL");
        if backend == Backend::Gateway && base_url.is_none() {
            return Err(InferenceError::config(
                "INFERENCE_BASE_URL must be set for the gateway backend",
            ));
        }

        let defaults = GenerationParams::default();
        let params = GenerationParams {
            temperature: parse_var("INFERENCE_TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_var("INFERENCE_MAX_TOKENS", defaults.max_tokens)?,
            top_p: parse_var("INFERENCE_TOP_P", defaults.top_p)?,
        };
        params.validate().map_err(InferenceError::config)?;

        Ok(Self {
            backend,
            api_key,
            base_url,
            model: non_empty_var("INFERENCE_MODEL")
                .unwrap_or_else(|| backend.default_model().to_string()),
            stream: parse_var("INFERENCE_STREAM", backend != Backend::Gateway)?,
            timeout: Duration::from_secs(
                std::env::var("INFERENCE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            params,
            retry: RetryPolicy::from_env(),
        })
    }

    /// API root actually used for requests.
    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .or_else(|| self.backend.default_base_url())
    }

    /// Build the configured backend.
    pub fn build_endpoint(&self) -> InferenceResult<Arc<dyn ModelEndpoint>> {
        let endpoint: Arc<dyn ModelEndpoint> = match self.backend {
            Backend::Chat => {
                let base = self.effective_base_url().unwrap_or(GROQ_BASE_URL);
                Arc::new(
                    ChatEndpoint::new(base, &self.api_key, self.timeout)?
                        .with_streaming(self.stream),
                )
            }
            Backend::Gateway => {
                let base = self.base_url.as_deref().ok_or_else(|| {
                    InferenceError::config("gateway backend requires a base URL")
                })?;
                Arc::new(
                    ChatEndpoint::gateway(base, &self.api_key, self.timeout)?
                        .with_streaming(self.stream),
                )
            }
            Backend::Gemini => {
                let base = self.effective_base_url().unwrap_or(GEMINI_BASE_URL);
                Arc::new(GeminiEndpoint::with_base_url(base, &self.api_key, self.timeout)?)
            }
        };
        Ok(endpoint)
    }

    /// Build a ready-to-use client for this configuration.
    pub fn build_client(&self) -> InferenceResult<InferenceClient> {
        Ok(InferenceClient::new(self.build_endpoint()?, &self.model)
            .with_params(self.params)
            .with_policy(self.retry.clone()))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> InferenceResult<T> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| InferenceError::config(format!("{} has invalid value '{}'", name, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "INFERENCE_BACKEND",
        "INFERENCE_API_KEY",
        "GROQ_API_KEY",
        "GEMINI_API_KEY",
        "INFERENCE_BASE_URL",
        "INFERENCE_MODEL",
        "INFERENCE_STREAM",
        "INFERENCE_TEMPERATURE",
        "INFERENCE_MAX_TOKENS",
        "INFERENCE_TOP_P",
        "INFERENCE_TIMEOUT_SECS",
        "INFERENCE_MAX_ATTEMPTS",
        "INFERENCE_RETRY_BASE_MS",
        "INFERENCE_RETRY_MAX_MS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_missing_credential_is_config_error() {
        clear_env();
        let err = EndpointConfig::from_env().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("INFERENCE_API_KEY"));
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    #[serial]
    fn test_blank_credential_counts_as_missing() {
        clear_env();
        std::env::set_var("GROQ_API_KEY", "   ");
        assert!(EndpointConfig::from_env().unwrap_err().is_configuration());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_chat_defaults() {
        clear_env();
        std::env::set_var("GROQ_API_KEY", "gsk_test");

        let config = EndpointConfig::from_env().unwrap();
        assert_eq!(config.backend, Backend::Chat);
        assert_eq!(config.api_key, "gsk_test");
        assert_eq!(config.model, "llama-3.2-90b-vision-preview");
        assert!(config.stream);
        assert_eq!(config.effective_base_url(), Some(GROQ_BASE_URL));
        assert_eq!(config.params, GenerationParams::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert!(!format!("{:?}", config).contains("gsk_test"));

        let client = config.build_client().unwrap();
        assert_eq!(client.backend(), "chat");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_gemini_backend_uses_its_own_key() {
        clear_env();
        std::env::set_var("INFERENCE_BACKEND", "gemini");
        std::env::set_var("GEMINI_API_KEY", "g-key");
        std::env::set_var("INFERENCE_TEMPERATURE", "0.2");

        let config = EndpointConfig::from_env().unwrap();
        assert_eq!(config.backend, Backend::Gemini);
        assert_eq!(config.model, "gemini-1.5-pro");
        assert_eq!(config.params.temperature, 0.2);
        assert_eq!(config.build_endpoint().unwrap().name(), "gemini");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_gateway_requires_base_url() {
        clear_env();
        std::env::set_var("INFERENCE_BACKEND", "gateway");
        std::env::set_var("INFERENCE_API_KEY", "k");
        assert!(EndpointConfig::from_env().unwrap_err().is_configuration());

        std::env::set_var("INFERENCE_BASE_URL", "https://relay.internal/v1");
        let config = EndpointConfig::from_env().unwrap();
        assert!(!config.stream);
        assert_eq!(config.build_endpoint().unwrap().name(), "gateway");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        clear_env();
        std::env::set_var("INFERENCE_API_KEY", "k");
        std::env::set_var("INFERENCE_TOP_P", "1.5");
        assert!(EndpointConfig::from_env().unwrap_err().is_configuration());

        std::env::set_var("INFERENCE_TOP_P", "abc");
        assert!(EndpointConfig::from_env().unwrap_err().is_configuration());

        std::env::remove_var("INFERENCE_TOP_P");
        std::env::set_var("INFERENCE_BACKEND", "carrier-pigeon");
        assert!(EndpointConfig::from_env().unwrap_err().is_configuration());
        clear_env();
    }

    #[test]
    fn test_backend_aliases() {
        assert_eq!("GROQ".parse::<Backend>().unwrap(), Backend::Chat);
        assert_eq!("google".parse::<Backend>().unwrap(), Backend::Gemini);
        assert_eq!(Backend::Gateway.to_string(), "gateway");
    }
}
