//! Parley HTTP REST API
//!
//! Axum-based HTTP server exposing the conversation operations to the
//! browser UI (and `parley-cli`).
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - POST /api/ask-ai  — forward a prompt to the chat-completion gateway
//! - POST /api/save    — persist a prompt/response pair
//! - GET  /api/history — 50 most recent conversations, newest first
//! - GET  /ping        — liveness check (target of the keep-alive pinger)

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parley_core::config::HttpConfig;
use parley_core::envelope::{AskBody, Envelope, HistoryBody, PingBody, SaveBody};
use parley_core::ParleyError;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::subsystems::conversation::{ConversationService, ServiceError};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub service: ConversationService,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ask-ai", post(ask_handler))
        .route("/api/save", post(save_handler))
        .route("/api/history", get(history_handler))
        .route("/ping", get(ping_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    config: &HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ParleyError> {
    let addr = format!("{}:{}", config.host, config.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Body of `POST /api/ask-ai`. A missing prompt is a validation error, not a
/// parse failure.
#[derive(Debug, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Body of `POST /api/save`.
#[derive(Debug, Default, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner ask — validates the prompt and calls the gateway through the service.
pub async fn ask_inner(
    service: &ConversationService,
    req: AskRequest,
) -> (StatusCode, serde_json::Value) {
    let prompt = req.prompt.unwrap_or_default();
    match service.ask(&prompt).await {
        Ok(response) => (StatusCode::OK, to_body(Envelope::ok(AskBody { response }))),
        Err(e) => error_response(&e),
    }
}

/// Inner save — persists the pair, reporting only a generic failure.
pub async fn save_inner(
    service: &ConversationService,
    req: SaveRequest,
) -> (StatusCode, serde_json::Value) {
    let prompt = req.prompt.unwrap_or_default();
    let response = req.response.unwrap_or_default();
    match service.save(&prompt, &response).await {
        Ok(saved) => {
            tracing::debug!(id = %saved.id, "Conversation saved");
            (
                StatusCode::OK,
                to_body(Envelope::ok(SaveBody {
                    message: "Conversation saved".to_string(),
                })),
            )
        }
        Err(e) => error_response(&e),
    }
}

/// Inner history — most recent conversations first.
pub async fn history_inner(service: &ConversationService) -> (StatusCode, serde_json::Value) {
    match service.list_history().await {
        Ok(data) => (StatusCode::OK, to_body(Envelope::ok(HistoryBody { data }))),
        Err(e) => error_response(&e),
    }
}

/// Inner ping — pure, no IO.
pub fn ping_inner() -> serde_json::Value {
    to_body(PingBody::alive())
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn ask_handler(
    State(state): State<Arc<HttpState>>,
    payload: Option<Json<AskRequest>>,
) -> impl IntoResponse {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = ask_inner(&state.service, req).await;
    (status, Json(body))
}

pub async fn save_handler(
    State(state): State<Arc<HttpState>>,
    payload: Option<Json<SaveRequest>>,
) -> impl IntoResponse {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = save_inner(&state.service, req).await;
    (status, Json(body))
}

pub async fn history_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = history_inner(&state.service).await;
    (status, Json(body))
}

pub async fn ping_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(ping_inner()))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert a service error into the uniform `{ success: false, ... }` envelope.
pub fn error_response(e: &ServiceError) -> (StatusCode, serde_json::Value) {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        to_body(Envelope::err(e.message.clone(), e.details.clone())),
    )
}

fn to_body<T: Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        serde_json::json!({
            "success": false,
            "error": format!("Failed to encode response: {}", e),
        })
    })
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::conversation::ErrorKind;
    use async_trait::async_trait;
    use parley_core::gateway::{ChatGateway, GatewayError};
    use parley_core::store::MemoryConversationStore;

    struct EchoGateway;

    #[async_trait]
    impl ChatGateway for EchoGateway {
        async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
            Ok(format!("echo: {}", prompt))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn make_service() -> ConversationService {
        ConversationService::new(Arc::new(EchoGateway), Arc::new(MemoryConversationStore::new()))
    }

    #[test]
    fn test_ping_inner_pure() {
        let v = ping_inner();
        assert_eq!(v["status"], "alive");
        assert!(v["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_ask_inner_success_envelope() {
        let service = make_service();
        let (status, body) = ask_inner(
            &service,
            AskRequest {
                prompt: Some("Hello".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["response"], "echo: Hello");
    }

    #[tokio::test]
    async fn test_ask_inner_missing_prompt_is_400() {
        let service = make_service();
        let (status, body) = ask_inner(&service, AskRequest::default()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Prompt is required");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_save_then_history_inner() {
        let service = make_service();
        let (status, body) = save_inner(
            &service,
            SaveRequest {
                prompt: Some("Hello".to_string()),
                response: Some("Hi there!".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "success": true, "message": "Conversation saved" }));

        let (status, body) = history_inner(&service).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"][0]["prompt"], "Hello");
        assert_eq!(body["data"][0]["response"], "Hi there!");
        assert!(body["data"][0]["createdAt"].is_string());
        assert!(body["data"][0]["id"].is_string());
    }

    #[tokio::test]
    async fn test_save_inner_missing_response_is_generic_500() {
        let service = make_service();
        let (status, body) = save_inner(
            &service,
            SaveRequest {
                prompt: Some("Hello".to_string()),
                response: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "error": "Failed to save conversation" })
        );
    }

    #[test]
    fn test_error_response_maps_kinds_to_status() {
        let cases = [
            (ErrorKind::Validation, StatusCode::BAD_REQUEST),
            (ErrorKind::Configuration, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorKind::UpstreamFailure, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorKind::StorageFailure, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (kind, expected) in cases {
            let (status, body) = error_response(&ServiceError::new(kind, "boom"));
            assert_eq!(status, expected, "kind {:?}", kind);
            assert_eq!(body["error"], "boom");
        }
    }

    #[test]
    fn test_error_response_includes_details_when_present() {
        let err = ServiceError::new(ErrorKind::UpstreamFailure, "Failed to get AI response")
            .with_details(serde_json::json!({ "error": "quota" }));
        let (_, body) = error_response(&err);
        assert_eq!(body["details"]["error"], "quota");
    }
}
