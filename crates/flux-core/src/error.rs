//! Error types for Flux core operations.

use crate::ids::IdError;

/// Result type for Flux core operations.
pub type Result<T> = std::result::Result<T, FluxError>;

/// Errors that can occur while interpreting donation data.
#[derive(Debug, thiserror::Error)]
pub enum FluxError {
    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The `custom` payload could not be decoded.
    #[error("custom payload decode failed: {0}")]
    CustomDecode(String),
}
