//! Error types for Dialr
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Dialr
#[derive(Debug, Error)]
pub enum DialrError {
    /// Participant not found in the ledger
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Operation not allowed in the participant's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller-supplied input was rejected
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Telephony provider error (call placement, recording download)
    #[error("Telephony error: {0}")]
    Telephony(String),

    /// External audio pipeline error
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Dispatch worker is gone or did not answer
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Dialr operations
pub type Result<T> = std::result::Result<T, DialrError>;
