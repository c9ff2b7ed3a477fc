//! Error types for the ingestion service

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the storage collaborator
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing store could not be reached or opened
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// An operation did not finish in time
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// A row violated a schema constraint; the whole transaction was rolled back
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Any other query failure
    #[error("Query failed: {0}")]
    Query(String),

    /// Payload (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking worker running the session panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),

    /// The session gate was closed during shutdown
    #[error("Session gate is closed")]
    GateClosed,
}

impl StorageError {
    /// Whether this failure means the store is unreachable (as opposed to a bad batch)
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Timeout(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match e {
            rusqlite::Error::SqliteFailure(ref err, _) => match err.code {
                ErrorCode::ConstraintViolation => StorageError::Constraint(e.to_string()),
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
                | ErrorCode::ReadOnly
                | ErrorCode::PermissionDenied => StorageError::Unavailable(e.to_string()),
                _ => StorageError::Query(e.to_string()),
            },
            other => StorageError::Query(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::Task(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Request validation errors, reported synchronously to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The request carried more events than a single call may enqueue
    #[error("Maximum {max} events per request (got {count})")]
    TooManyEvents { count: usize, max: usize },

    /// An event failed a field-level check
    #[error("Invalid event at index {index}: {reason}")]
    InvalidEvent { index: usize, reason: String },
}

/// Authentication errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// API key / tenant pair did not match
    #[error("Invalid API key or tenant")]
    InvalidCredentials,

    /// Bearer token failed to decode or verify
    #[error("Token error: {0}")]
    TokenError(String),

    /// Bearer token is past its expiry
    #[error("Token has expired")]
    TokenExpired,

    /// Token minting requested without a configured secret
    #[error("JWT secret is not configured")]
    MissingSecret,
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file was not valid TOML for this schema
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// An environment override could not be parsed
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    /// A value parsed but is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
