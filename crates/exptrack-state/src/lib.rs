//! exptrack-state: entity model and persistence for exptrack
//!
//! This crate owns everything below the registry's use-case layer: the
//! experiment/run entity model, the [`ExperimentRepository`] port, and two
//! adapters for it.
//!
//! ## Key Components
//!
//! - `model`: `Experiment`, `Run` and its children, plus the validated inputs
//! - `ExperimentRepository`: async storage port
//! - `MemoryExperimentRepository`: in-process adapter for tests and embedding
//! - `SurrealExperimentRepository`: SurrealDB adapter with commit-time
//!   uniqueness and atomic run inserts
//! - `SurrealHandle`: connection, configuration, and schema setup

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
pub mod model;
pub mod schema;
pub mod storage_traits;
pub mod surreal_repository;

pub use error::{StateError, StorageError};
pub use fakes::MemoryExperimentRepository;
pub use handle::{
    query_timeout_from_env, CloudConfig, SurrealHandle, DEFAULT_DATABASE, DEFAULT_LOCAL_PATH,
    DEFAULT_NAMESPACE, DEFAULT_QUERY_TIMEOUT,
};
pub use model::{
    validate_version, Artifact, Experiment, ExperimentId, Metric, NewArtifact, NewExperiment,
    NewMetric, NewParameter, NewRun, Parameter, Run, RunId, RunStatus, ValidationError,
};
pub use storage_traits::{ExperimentRepository, StorageResult};
pub use surreal_repository::SurrealExperimentRepository;

/// Result type for exptrack-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
