//! Conversation Store — the persistence boundary for prompt/response pairs.
//!
//! The service only ever inserts and reads the most recent records; there is
//! no update or delete path. Ids and creation timestamps are assigned here,
//! never by the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use uuid::Uuid;

use crate::models::{Conversation, NewConversation};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a new conversation, returning it with its assigned id and timestamp.
    async fn insert(&self, conversation: NewConversation) -> Result<Conversation, StoreError>;

    /// At most `limit` conversations, newest first.
    async fn find_recent(&self, limit: usize) -> Result<Vec<Conversation>, StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

fn check_required(conversation: &NewConversation) -> Result<(), StoreError> {
    if conversation.prompt.is_empty() {
        return Err(StoreError::InvalidRecord("prompt is required".to_string()));
    }
    if conversation.response.is_empty() {
        return Err(StoreError::InvalidRecord("response is required".to_string()));
    }
    Ok(())
}

// ============================================================================
// PgConversationStore
// ============================================================================

/// Postgres-backed store. The `conversations` table is created on the first
/// call rather than at construction, so a database that comes up after the
/// server still gets its schema. A failed bootstrap is retried on the next call.
#[derive(Debug)]
pub struct PgConversationStore {
    pool: PgPool,
    schema: OnceCell<()>,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema: OnceCell::new(),
        }
    }

    async fn ready(&self) -> Result<(), StoreError> {
        self.schema
            .get_or_try_init(|| async {
                crate::db::ensure_schema(&self.pool).await?;
                tracing::info!("conversations table ready");
                Ok::<(), sqlx::Error>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn insert(&self, conversation: NewConversation) -> Result<Conversation, StoreError> {
        check_required(&conversation)?;
        self.ready().await?;

        let row = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (prompt, response)
            VALUES ($1, $2)
            RETURNING id, prompt, response, created_at
            "#,
        )
        .bind(&conversation.prompt)
        .bind(&conversation.response)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Conversation>, StoreError> {
        self.ready().await?;

        let rows = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, prompt, response, created_at
            FROM conversations
            ORDER BY created_at DESC, seq DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// MemoryConversationStore
// ============================================================================

/// Process-local store. Records live in insertion order; timestamps never
/// go backwards even if the wall clock does.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    records: RwLock<Vec<Conversation>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn next_timestamp(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if last > now => last,
        _ => now,
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn insert(&self, conversation: NewConversation) -> Result<Conversation, StoreError> {
        check_required(&conversation)?;

        let mut records = self.records.write().await;
        let created_at = next_timestamp(records.last().map(|c| c.created_at), Utc::now());
        let stored = Conversation {
            id: Uuid::new_v4(),
            prompt: conversation.prompt,
            response: conversation.response,
            created_at,
        };
        records.push(stored.clone());
        Ok(stored)
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Conversation>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// TESTS
// ============================================================================
