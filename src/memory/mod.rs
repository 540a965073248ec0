//! Conversation memory
//!
//! Per-session turn history. Lives as long as the session; nothing is
//! persisted.

pub mod store;

pub use store::{ConversationHistory, ConversationTurn};
