//! Core error types for synk-core.
//!
//! Expired credentials pause a pair and schema problems block it until it is
//! reconfigured. Network and API failures are retried with backoff.

use std::path::PathBuf;
use thiserror::Error;

use crate::integrations::Service;

/// Error type for synchronization operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No valid (or refreshable) access token exists for the service.
    /// Requires the user to re-authenticate; never retried by the engine.
    #[error("Authentication expired for {service}")]
    AuthenticationExpired { service: Service },

    /// The Notion database cannot be synchronized as configured
    /// (e.g. it has no date property). Fatal for the pair.
    #[error("Schema error for database '{database_id}': {reason}")]
    Schema { database_id: String, reason: String },

    /// The configured sync window does not fit the calendar's date range.
    #[error("Sync window of {days} days around now is out of range")]
    InvalidWindow { days: i64 },

    /// Transport-level failure talking to a remote API.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote API answered with a non-success status.
    #[error("{service} API error (HTTP {status}): {body}")]
    Api {
        service: Service,
        status: u16,
        body: String,
    },

    /// The durable stats store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the scheduler should retry the job with backoff.
    ///
    /// Authentication, schema and window failures need a human.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            SyncError::AuthenticationExpired { .. }
                | SyncError::Schema { .. }
                | SyncError::InvalidWindow { .. }
        )
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, SyncError::AuthenticationExpired { .. })
    }
}

/// Field mapping errors. Never fatal: the offending item is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Page '{page_id}' has no value for date property '{property}'")]
    MissingDate { page_id: String, property: String },

    #[error("Unparsable date '{value}' on record '{record_id}'")]
    InvalidDate { record_id: String, value: String },
}

/// Stats store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    /// Stored value could not be decoded
    #[error("Corrupt value for key '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Value could not be encoded
    #[error("Failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(#[from] std::io::Error),
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

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for SyncError
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
