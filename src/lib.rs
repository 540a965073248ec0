//! Ledger Chat
//!
//! Answers natural-language questions about a group's shared-expense ledger:
//! - Fetches the group's expenses from the ledger service
//! - Normalizes them into per-expense documents plus monthly per-category summaries
//! - Indexes the documents for semantic search with metadata filters
//! - Retrieves with self-querying and relevance compression
//! - Answers through a per-turn state machine with session memory
//!
//! PIPELINE:
//! LEDGER → NORMALIZE → SUMMARIZE → INDEX → RETRIEVE → ANSWER

pub mod aggregator;
pub mod api;
pub mod config;
pub mod conversation;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ledger;
pub mod llm;
pub mod memory;
pub mod models;
pub mod normalizer;
pub mod prompts;
pub mod retrieval;
pub mod session;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{LedgerChatError, Result};

// Re-export common types
pub use config::AppConfig;
pub use models::*;
pub use session::{ChatService, SessionId, SessionInfo};
