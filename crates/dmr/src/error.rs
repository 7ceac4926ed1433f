//! Error types for model parsing.

use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or parsing management model nodes.
#[derive(Debug, Error)]
pub enum Error {
    /// The text or tree does not describe a valid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An address could not be parsed.
    #[error("invalid address '{input}': {reason}")]
    InvalidAddress {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The text is not valid JSON.
    #[error("malformed operation text: {0}")]
    Json(#[from] serde_json::Error),
}
