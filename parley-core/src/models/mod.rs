pub mod conversation;

pub use conversation::{Conversation, NewConversation};
