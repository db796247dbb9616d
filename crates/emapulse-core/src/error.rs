//! Core error types for emapulse-core.
//!
//! This module defines the error hierarchy using thiserror. None of these
//! errors is fatal to a running sweep: store conflicts and stale updates are
//! recovered locally, delivery failures are logged and retried on the next
//! tick.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for emapulse-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// State-store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Push-delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// State-store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// An active state already exists for this (user, label) pair.
    /// Raised by the uniqueness constraint, so concurrent duplicate
    /// starts lose the race instead of creating a second row.
    #[error("Active state already exists for user '{user_id}' and label '{label_id}'")]
    Conflict { user_id: String, label_id: String },

    /// The referenced state id does not resolve to an active row
    /// (stale or duplicate update).
    #[error("No active state with id '{state_id}'")]
    NotFound { state_id: String },

    /// No catalog entry matches the given id or name.
    #[error("No label matching '{0}'")]
    UnknownLabel(String),

    /// Label definition violates the kind/parameter invariant.
    #[error("Invalid label '{name}': {message}")]
    InvalidLabel { name: String, message: String },

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Push-delivery errors. Delivery never mutates the state store; a failed
/// attempt leaves the state due, to be retried on the next sweep.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The user has no registered push endpoint. Non-retriable for this
    /// sweep; the client sees the pending prompt by polling instead.
    #[error("No push subscription for user '{user_id}'")]
    NoSubscription { user_id: String },

    /// The push endpoint answered with a non-success status.
    #[error("Push endpoint rejected payload: HTTP {status}")]
    Rejected { status: u16 },

    /// Transport-level failure talking to the push endpoint.
    #[error("Push transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The stored endpoint is not a usable URL.
    #[error("Invalid push endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
