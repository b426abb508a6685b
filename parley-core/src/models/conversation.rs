use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted prompt/response pair. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub prompt: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload. `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub prompt: String,
    pub response: String,
}

impl NewConversation {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_created_at_in_camel_case() {
        let conversation = Conversation {
            id: Uuid::nil(),
            prompt: "Hello".to_string(),
            response: "Hi there!".to_string(),
            created_at: "2026-02-23T10:00:00Z".parse().unwrap(),
        };

        let json = serde_json::to_value(&conversation).unwrap();
        assert_eq!(json["prompt"], "Hello");
        assert_eq!(json["response"], "Hi there!");
        assert_eq!(json["createdAt"], "2026-02-23T10:00:00Z");
        assert!(json.get("created_at").is_none());
    }
}
