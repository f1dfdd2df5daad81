//! Experiment/run use cases.
//!
//! `ExperimentService` composes the repository port and the version allocator.
//! All shape validation happens before the first write, and every call is
//! reported to the observer exactly once whether it succeeds or not.

use std::sync::Arc;

use exptrack_state::{Experiment, ExperimentRepository, NewExperiment, NewRun, Run, RunId};
use tracing::{debug, instrument};

use crate::allocator::RunVersionAllocator;
use crate::error::{RegistryError, Result};
use crate::obs::{Operation, RegistryEvent, RegistryObserver, TracingObserver};

/// Registry entry point. Cheap to clone; holds no state of its own, so one
/// instance can serve any number of concurrent callers.
#[derive(Clone)]
pub struct ExperimentService {
    repo: Arc<dyn ExperimentRepository>,
    observer: Arc<dyn RegistryObserver>,
}

impl ExperimentService {
    /// Build a service that reports through [`TracingObserver`].
    pub fn new(repo: Arc<dyn ExperimentRepository>) -> Self {
        Self {
            repo,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RegistryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn repository(&self) -> &Arc<dyn ExperimentRepository> {
        &self.repo
    }

    /// Create an experiment with a unique, non-empty name.
    #[instrument(skip_all, fields(experiment_name = %input.name))]
    pub async fn create_experiment(&self, input: NewExperiment) -> Result<Experiment> {
        let event = RegistryEvent::new(Operation::CreateExperiment)
            .with_experiment_name(input.name.clone());

        let result = self.create_experiment_inner(&input).await;
        self.report(event, &result, |event, experiment| {
            event.with_experiment_id(experiment.id)
        });
        result
    }

    /// Create a run and all of its children as one unit.
    ///
    /// Order of checks: experiment exists, version admissible, children
    /// well-formed. The insert itself is the final word on version
    /// uniqueness.
    #[instrument(skip_all, fields(experiment_id = %input.experiment_id, version = input.version))]
    pub async fn create_run(&self, input: NewRun) -> Result<Run> {
        let event = RegistryEvent::new(Operation::CreateRun)
            .with_experiment_id(input.experiment_id)
            .with_version(input.version);

        let result = self.create_run_inner(input).await;
        self.report(event, &result, |event, run| event.with_run_id(run.id));
        result
    }

    /// Load a run with its parameters, metrics, and artifacts.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn get_run(&self, run_id: RunId) -> Result<Run> {
        let event = RegistryEvent::new(Operation::GetRun).with_run_id(run_id);

        let result = match self.repo.get_run_with_children(run_id).await {
            Ok(Some(run)) => Ok(run),
            Ok(None) => Err(RegistryError::RunNotFound(run_id)),
            Err(e) => Err(e.into()),
        };
        self.report(event, &result, |event, run| {
            event
                .with_experiment_id(run.experiment_id)
                .with_version(run.version)
        });
        result
    }

    async fn create_experiment_inner(&self, input: &NewExperiment) -> Result<Experiment> {
        input.validate()?;

        if self
            .repo
            .find_experiment_by_name(&input.name)
            .await?
            .is_some()
        {
            return Err(RegistryError::ExperimentNameTaken {
                name: input.name.clone(),
            });
        }

        // A racing caller can still win between lookup and insert; the
        // adapter reports that as a duplicate name, which maps to the same
        // variant.
        let experiment = self
            .repo
            .insert_experiment(&input.name, input.description.as_deref())
            .await?;
        debug!(experiment_id = %experiment.id, "experiment committed");
        Ok(experiment)
    }

    async fn create_run_inner(&self, input: NewRun) -> Result<Run> {
        if self
            .repo
            .find_experiment_by_id(input.experiment_id)
            .await?
            .is_none()
        {
            return Err(RegistryError::ExperimentNotFound(input.experiment_id));
        }

        RunVersionAllocator::new(self.repo.as_ref())
            .check(input.experiment_id, input.version)
            .await?;

        input.validate_children()?;

        let run = self.repo.insert_run_with_children(input).await?;
        debug!(
            run_id = %run.id,
            parameters = run.parameters.len(),
            metrics = run.metrics.len(),
            artifacts = run.artifacts.len(),
            "run committed"
        );
        Ok(run)
    }

    fn report<T>(
        &self,
        event: RegistryEvent,
        result: &Result<T>,
        on_success: impl FnOnce(RegistryEvent, &T) -> RegistryEvent,
    ) {
        let event = match result {
            Ok(value) => on_success(event, value),
            Err(err) => event.with_error(err),
        };
        self.observer.record(&event);
    }
}
