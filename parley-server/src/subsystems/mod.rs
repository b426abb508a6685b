pub mod conversation;
pub mod keepalive;
