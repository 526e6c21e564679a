//! Error types for dailybrief
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in the briefing core
#[derive(Debug, Error)]
pub enum BriefError {
    /// Processed item or raw item not found in storage
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Model output could not be turned into a processed item
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    /// No provider lane could be initialised; nothing can be scheduled
    #[error("No usable provider lane available")]
    NoProviderLanes,

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Notifier transport error
    #[error("Notify error: {0}")]
    Notify(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for briefing operations
pub type Result<T> = std::result::Result<T, BriefError>;
