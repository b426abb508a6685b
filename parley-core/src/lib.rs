pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod models;
pub mod store;

pub use config::ParleyConfig;
pub use envelope::{AskBody, Envelope, ErrorBody, HistoryBody, PingBody, SaveBody};
pub use error::ParleyError;
pub use gateway::{ChatGateway, GatewayError, OpenRouterClient};
pub use models::{Conversation, NewConversation};
pub use store::{ConversationStore, MemoryConversationStore, PgConversationStore, StoreError};
