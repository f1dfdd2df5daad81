//! Registry-level error taxonomy.
//!
//! Every failure a service call can produce falls into one of four kinds;
//! transports branch on [`ErrorKind`] rather than on individual variants.

use std::fmt;

use exptrack_state::{ExperimentId, RunId, StorageError, ValidationError};
use serde::Serialize;

/// Coarse classification of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input. Never retried.
    Validation,
    /// Duplicate experiment name or run version. Caller picks another.
    Conflict,
    /// Unknown experiment or run id.
    NotFound,
    /// Adapter failure, including timeouts.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Storage => "storage",
        }
    }

    /// Whether the caller, not the registry, is at fault.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, ErrorKind::Storage)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`crate::ExperimentService`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("experiment name '{name}' already exists")]
    ExperimentNameTaken { name: String },

    #[error("version {version} already exists for experiment {experiment_id}")]
    RunVersionTaken {
        experiment_id: ExperimentId,
        version: i64,
    },

    #[error("experiment {0} not found")]
    ExperimentNotFound(ExperimentId),

    #[error("run {0} not found")]
    RunNotFound(RunId),

    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Validation(_) => ErrorKind::Validation,
            RegistryError::ExperimentNameTaken { .. } | RegistryError::RunVersionTaken { .. } => {
                ErrorKind::Conflict
            }
            RegistryError::ExperimentNotFound(_) | RegistryError::RunNotFound(_) => {
                ErrorKind::NotFound
            }
            RegistryError::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Constraint violations detected at commit time land in the same variants
/// as the service's own pre-checks.
impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateExperimentName { name } => {
                RegistryError::ExperimentNameTaken { name }
            }
            StorageError::DuplicateRunVersion {
                experiment_id,
                version,
            } => RegistryError::RunVersionTaken {
                experiment_id: ExperimentId(experiment_id),
                version,
            },
            StorageError::ExperimentNotFound { experiment_id } => {
                RegistryError::ExperimentNotFound(ExperimentId(experiment_id))
            }
            other => RegistryError::Storage(other),
        }
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
