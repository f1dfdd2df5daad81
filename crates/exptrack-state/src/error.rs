//! Error types for exptrack-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the backing store
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Connection(err.to_string())
    }
}

/// Errors returned by [`crate::storage_traits::ExperimentRepository`] operations.
///
/// The two `Duplicate*` variants are the commit-time uniqueness signals; callers
/// treat them as conflicts rather than backend failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// An experiment with this name was committed first
    #[error("experiment name '{name}' already exists")]
    DuplicateExperimentName { name: String },

    /// The `(experiment_id, version)` pair was committed first
    #[error("version {version} already exists for experiment {experiment_id}")]
    DuplicateRunVersion { experiment_id: i64, version: i64 },

    /// The parent experiment vanished or never existed at commit time
    #[error("experiment {experiment_id} not found")]
    ExperimentNotFound { experiment_id: i64 },

    /// The backend did not answer within the configured bound
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Any other backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
