//! AI Gateway — forwards a single user prompt to an OpenRouter-compatible
//! chat-completion API and extracts the first completion's text.
//!
//! One outbound call per prompt, no retries. The credential is checked before
//! anything touches the network.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;

// ============================================================================
// ChatGateway trait
// ============================================================================

/// Abstraction over chat-completion providers.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send `prompt` as a single user message and return the answer text.
    /// Callers are responsible for rejecting empty prompts.
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("OpenRouter API key not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status. `details` carries the upstream payload (JSON if it
    /// parsed, otherwise the raw body as a string).
    #[error("API error ({code}): {message}")]
    Api {
        code: u16,
        message: String,
        details: serde_json::Value,
    },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Best-effort diagnostic payload for the caller.
    pub fn details(&self) -> serde_json::Value {
        match self {
            GatewayError::Api { details, .. } => details.clone(),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorResponse {
    error: Option<UpstreamErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorDetail {
    code: Option<serde_json::Value>,
    message: Option<String>,
}

/// Pull the first completion's message text out of a response body.
fn extract_content(body: ChatResponse) -> Result<String, GatewayError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::MalformedResponse("no choices in response".to_string()))?;

    choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| GatewayError::MalformedResponse("first choice has no message content".to_string()))
}

// ============================================================================
// OpenRouterClient
// ============================================================================

/// OpenRouter chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: config.credential().map(str::to_string),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: &GatewayConfig, base_url: String) -> Result<Self, GatewayError> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.trim_end_matches('/').to_string();
        Ok(client)
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ChatGateway for OpenRouterClient {
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or(GatewayError::MissingApiKey)?;

        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let details = serde_json::from_str::<serde_json::Value>(&error_body)
                .unwrap_or_else(|_| serde_json::Value::String(error_body.clone()));
            let message = serde_json::from_str::<UpstreamErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .and_then(|e| {
                    e.message.or_else(|| e.code.map(|c| c.to_string()))
                })
                .unwrap_or_else(|| status.to_string());

            tracing::error!(code = status.as_u16(), message = %message, "OpenRouter API error");

            return Err(GatewayError::Api {
                code: status.as_u16(),
                message,
                details,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        extract_content(body)
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

// ============================================================================
// TESTS
// ============================================================================
