//! Error types for the Tiergate service.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Tiergate operations.
#[derive(Error, Debug)]
pub enum TiergateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A plan name that is not present in the tier table
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    /// Counting store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tiergate operations.
pub type Result<T> = std::result::Result<T, TiergateError>;
