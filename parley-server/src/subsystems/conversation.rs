//! Conversation Service — ask, save, list-history.
//!
//! Each operation is independent and stateless between calls. `ask` never
//! persists; saving is a separate explicit step, so a response that is never
//! saved is lost.

use std::sync::Arc;

use parley_core::config::ParleyConfig;
use parley_core::gateway::{ChatGateway, GatewayError, OpenRouterClient};
use parley_core::models::{Conversation, NewConversation};
use parley_core::store::ConversationStore;
use parley_core::ParleyError;
use thiserror::Error;

/// History is capped at the most recent 50 conversations.
pub const HISTORY_LIMIT: usize = 50;

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Configuration,
    UpstreamFailure,
    StorageFailure,
}

/// Tagged failure of a service operation. `message` is safe to show to a
/// client; `details` only ever carries upstream gateway diagnostics.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// HTTP status for this error: validation is the caller's fault, the
    /// rest are ours.
    pub fn status_code(&self) -> u16 {
        match self.kind {
            ErrorKind::Validation => 400,
            ErrorKind::Configuration | ErrorKind::UpstreamFailure | ErrorKind::StorageFailure => {
                500
            }
        }
    }
}

impl From<GatewayError> for ServiceError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::MissingApiKey => {
                ServiceError::new(ErrorKind::Configuration, "OpenRouter API key not configured")
            }
            other => ServiceError::new(ErrorKind::UpstreamFailure, "Failed to get AI response")
                .with_details(other.details()),
        }
    }
}

// ============================================================================
// ConversationService
// ============================================================================

#[derive(Clone)]
pub struct ConversationService {
    gateway: Arc<dyn ChatGateway>,
    store: Arc<dyn ConversationStore>,
}

impl ConversationService {
    pub fn new(gateway: Arc<dyn ChatGateway>, store: Arc<dyn ConversationStore>) -> Self {
        Self { gateway, store }
    }

    /// Wire the OpenRouter gateway from config around an already-built store.
    pub fn from_config(
        config: &ParleyConfig,
        store: Arc<dyn ConversationStore>,
    ) -> Result<Self, ParleyError> {
        let client = OpenRouterClient::new(&config.gateway)?;
        if !client.has_credential() {
            tracing::warn!("OPENROUTER_API_KEY not set; ask requests will fail until configured");
        }
        Ok(Self::new(Arc::new(client), store))
    }

    /// Forward a prompt to the gateway and return its answer unchanged.
    pub async fn ask(&self, prompt: &str) -> Result<String, ServiceError> {
        if prompt.trim().is_empty() {
            return Err(ServiceError::new(ErrorKind::Validation, "Prompt is required"));
        }

        match self.gateway.complete(prompt).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                tracing::error!(gateway = self.gateway.name(), error = %e, details = %e.details(), "Gateway call failed");
                Err(e.into())
            }
        }
    }

    /// Persist a prompt/response pair. Storage detail is logged, never returned;
    /// a pair the store refuses (empty prompt or response) is reported the same
    /// way as any other storage failure.
    pub async fn save(&self, prompt: &str, response: &str) -> Result<Conversation, ServiceError> {
        self.store
            .insert(NewConversation::new(prompt, response))
            .await
            .map_err(|e| {
                tracing::error!(store = self.store.name(), error = %e, "Failed to save conversation");
                ServiceError::new(ErrorKind::StorageFailure, "Failed to save conversation")
            })
    }

    /// Up to [`HISTORY_LIMIT`] conversations, most recent first.
    pub async fn list_history(&self) -> Result<Vec<Conversation>, ServiceError> {
        self.store.find_recent(HISTORY_LIMIT).await.map_err(|e| {
            tracing::error!(store = self.store.name(), error = %e, "Failed to fetch history");
            ServiceError::new(ErrorKind::StorageFailure, "Failed to fetch history")
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
