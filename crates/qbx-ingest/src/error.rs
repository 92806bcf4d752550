//! Error types for extraction and loading

use qbx_common::QbxError;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failure modes of one ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    /// Token exchange returned something other than HTTP 200 with a token
    #[error("Authentication failed (HTTP {status}): {body}")]
    Auth { status: u16, body: String },

    /// Network-level failure talking to the remote API
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote API answered with a non-success status other than 429
    #[error("Unexpected HTTP {status} from remote API: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// HTTP 429 persisted past the configured attempt ceiling
    #[error("Rate limited on {attempts} consecutive attempts")]
    RateLimitExhausted { attempts: u32 },

    /// Response body did not have the expected shape
    #[error("Failed to decode remote response: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] QbxError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether the error happened while paging through the remote API.
    ///
    /// These are the errors governed by the extractor's failure policy;
    /// everything else always propagates.
    pub fn is_pagination_failure(&self) -> bool {
        matches!(
            self,
            IngestError::Transport(_)
                | IngestError::UnexpectedStatus { .. }
                | IngestError::RateLimitExhausted { .. }
                | IngestError::Decode(_)
        )
    }
}
