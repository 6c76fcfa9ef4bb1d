//! Error types for the memory engine.
//!
//! Every library operation returns [`Result`]. [`HsgError::kind`] gives the short
//! machine-readable label surfaced to callers above the core.

use thiserror::Error;

/// Result type alias using the engine's error type.
pub type Result<T> = std::result::Result<T, HsgError>;

#[derive(Error, Debug)]
pub enum HsgError {
    /// Missing credential or unusable configuration. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transient failure talking to an embedding backend (HTTP error, rate limit, timeout).
    #[error("{provider} provider error: {message}")]
    Provider {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    /// Embedding did not succeed within the retry budget.
    #[error("embedding failed after {attempts} attempts: {message}")]
    EmbeddingExhausted { attempts: u32, message: String },

    #[error("memory not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HsgError {
    /// Build a provider error without an HTTP status.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Short machine-readable kind, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Provider { .. } => "provider",
            Self::EmbeddingExhausted { .. } => "embedding_failed",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Store(_) => "store",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// Only transient provider failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
