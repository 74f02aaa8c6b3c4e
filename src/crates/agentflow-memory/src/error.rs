//! Error types for memory operations

use thiserror::Error;

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors that can occur during memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Entry not found
    #[error("Memory entry not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid query
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Custom error
    #[error("{0}")]
    Custom(String),
}
