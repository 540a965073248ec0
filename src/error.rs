//! Error types for the ledger chat assistant

use thiserror::Error;

/// Result type alias for ledger chat operations
pub type Result<T> = std::result::Result<T, LedgerChatError>;

#[derive(Error, Debug)]
pub enum LedgerChatError {

    // =============================
    // Ledger Boundary Errors
    // =============================

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Malformed expense record: {0}")]
    MalformedRecord(String),

    // =============================
    // Pipeline Errors
    // =============================

    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LedgerChatError {
    /// Errors the conversation controller recovers from by answering
    /// without retrieved documents.
    pub fn is_retrieval(&self) -> bool {
        matches!(self, LedgerChatError::RetrievalError(_))
    }

    /// Errors that must never be retried with the same inputs.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerChatError::AuthError(_)
                | LedgerChatError::MalformedRecord(_)
                | LedgerChatError::ConfigError(_)
        )
    }
}
