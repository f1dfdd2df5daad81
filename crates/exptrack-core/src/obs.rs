//! Structured observability hooks for registry operations.
//!
//! The service reports each call as one [`RegistryEvent`] through an injected
//! [`RegistryObserver`]. Nothing here is process-global: the formatting and
//! shipping of events belongs to whichever observer the caller wires in.
//!
//! - [`TracingObserver`] emits events through `tracing` (`event = "run.created"`
//!   style fields; failures at `warn!`).
//! - [`RecordingObserver`] keeps events in memory for assertions.

use std::sync::{Mutex, PoisonError};

use exptrack_state::{ExperimentId, RunId};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ErrorKind, RegistryError};

/// Which service call produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateExperiment,
    CreateRun,
    GetRun,
}

/// How the call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    /// Client-fault error: validation, conflict, not found.
    Rejected,
    /// Storage failure.
    Failed,
}

/// One completed service call with whatever identifiers were known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryEvent {
    pub operation: Operation,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<ExperimentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RegistryEvent {
    /// Start a successful event; [`RegistryEvent::with_error`] marks it rejected or failed.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            outcome: Outcome::Succeeded,
            experiment_name: None,
            experiment_id: None,
            version: None,
            run_id: None,
            error_kind: None,
            detail: None,
        }
    }

    pub fn with_experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = Some(name.into());
        self
    }

    pub fn with_experiment_id(mut self, id: ExperimentId) -> Self {
        self.experiment_id = Some(id);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_run_id(mut self, id: RunId) -> Self {
        self.run_id = Some(id);
        self
    }

    /// Record the error, classifying the outcome by its kind.
    pub fn with_error(mut self, err: &RegistryError) -> Self {
        let kind = err.kind();
        self.outcome = if kind.is_client_fault() {
            Outcome::Rejected
        } else {
            Outcome::Failed
        };
        self.error_kind = Some(kind);
        self.detail = Some(err.to_string());
        self
    }

    /// Dotted name used as the `event` field, e.g. `run.created`.
    pub fn name(&self) -> &'static str {
        match (self.operation, self.outcome) {
            (Operation::CreateExperiment, Outcome::Succeeded) => "experiment.created",
            (Operation::CreateExperiment, Outcome::Rejected) => "experiment.create_rejected",
            (Operation::CreateExperiment, Outcome::Failed) => "experiment.create_failed",
            (Operation::CreateRun, Outcome::Succeeded) => "run.created",
            (Operation::CreateRun, Outcome::Rejected) => "run.create_rejected",
            (Operation::CreateRun, Outcome::Failed) => "run.create_failed",
            (Operation::GetRun, Outcome::Succeeded) => "run.fetched",
            (Operation::GetRun, Outcome::Rejected) => "run.fetch_rejected",
            (Operation::GetRun, Outcome::Failed) => "run.fetch_failed",
        }
    }
}

/// Sink for registry events.
pub trait RegistryObserver: Send + Sync {
    fn record(&self, event: &RegistryEvent);
}

/// Emits each event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RegistryObserver for TracingObserver {
    fn record(&self, event: &RegistryEvent) {
        let experiment_id = event.experiment_id.map(|id| id.0);
        let run_id = event.run_id.map(|id| id.0);
        let error_kind = event.error_kind.map(|k| k.as_str());

        match event.outcome {
            Outcome::Succeeded | Outcome::Rejected => info!(
                event = event.name(),
                experiment_name = event.experiment_name.as_deref(),
                experiment_id,
                version = event.version,
                run_id,
                error_kind,
                detail = event.detail.as_deref(),
            ),
            Outcome::Failed => warn!(
                event = event.name(),
                experiment_name = event.experiment_name.as_deref(),
                experiment_id,
                version = event.version,
                run_id,
                error_kind,
                detail = event.detail.as_deref(),
            ),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RegistryEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RegistryObserver for RecordingObserver {
    fn record(&self, event: &RegistryEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
