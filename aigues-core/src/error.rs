//! Core error types for Aigues.

use thiserror::Error;

/// Core error type for Aigues operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Username does not look like a NIF/NIE.
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data from API response.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Timestamp could not be parsed.
    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
