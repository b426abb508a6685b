//! JSON envelope shared by the HTTP surface and its clients.
//!
//! Success bodies carry `success: true` plus exactly one payload field
//! (`response`, `message` or `data`); failures carry `success: false`, an
//! `error` message and, for upstream failures only, `details`.

use serde::{Deserialize, Serialize};

use crate::models::Conversation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskBody {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveBody {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryBody {
    pub data: Vec<Conversation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl<T> Envelope<T> {
    pub fn ok(body: T) -> Self {
        Self {
            success: true,
            body,
        }
    }
}

impl Envelope<ErrorBody> {
    pub fn err(msg: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            body: ErrorBody {
                error: msg.into(),
                details,
            },
        }
    }
}

/// Body of `GET /ping`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingBody {
    pub status: String,
    pub timestamp: String,
}

impl PingBody {
    pub fn alive() -> Self {
        Self {
            status: "alive".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}
