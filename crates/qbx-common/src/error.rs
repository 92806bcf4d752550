//! Error types shared across QBX crates

use thiserror::Error;

/// Result type alias for shared QBX operations
pub type Result<T> = std::result::Result<T, QbxError>;

/// Errors raised by shared configuration and domain types
#[derive(Error, Debug)]
pub enum QbxError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Invalid extraction window: start {start} is after end {end}")]
    InvalidWindow { start: String, end: String },
}
