//! Storage trait definitions for exptrack
//!
//! [`ExperimentRepository`] is the port between the registry's use-case logic
//! and a concrete store. It is async and backend-agnostic; an in-memory fake
//! lives in the `fakes` module and the SurrealDB adapter in
//! `surreal_repository`.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{Experiment, ExperimentId, NewRun, Run, RunId};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Experiment/run persistence.
///
/// Guarantees every implementation must keep:
/// - `insert_experiment` never commits two experiments with the same name;
///   the loser of a race gets `StorageError::DuplicateExperimentName`.
/// - `insert_run_with_children` commits the run and all of its children as one
///   unit, or nothing. A colliding `(experiment_id, version)` yields
///   `StorageError::DuplicateRunVersion` at commit time regardless of any
///   earlier check; a missing parent yields `StorageError::ExperimentNotFound`.
/// - `get_run_with_children` returns children in insertion order.
/// - No operation blocks indefinitely; an unresponsive backend surfaces as
///   `StorageError::Timeout`.
#[async_trait]
pub trait ExperimentRepository: Send + Sync {
    /// Look up an experiment by exact (case-sensitive) name.
    async fn find_experiment_by_name(&self, name: &str) -> StorageResult<Option<Experiment>>;

    /// Look up an experiment by id.
    async fn find_experiment_by_id(&self, id: ExperimentId) -> StorageResult<Option<Experiment>>;

    /// Create an experiment, assigning its id and `created_at`.
    async fn insert_experiment(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> StorageResult<Experiment>;

    /// Every version already committed for an experiment.
    async fn list_run_versions(&self, experiment_id: ExperimentId) -> StorageResult<BTreeSet<i64>>;

    /// Atomically create a run and its parameters, metrics, and artifacts.
    async fn insert_run_with_children(&self, run: NewRun) -> StorageResult<Run>;

    /// Load a run with all of its children attached.
    async fn get_run_with_children(&self, run_id: RunId) -> StorageResult<Option<Run>>;
}
