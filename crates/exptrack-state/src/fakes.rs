//! In-memory fakes for storage traits
//!
//! `MemoryExperimentRepository` satisfies the [`ExperimentRepository`] contract
//! without any external dependencies. Every mutation happens under a single
//! lock, so uniqueness checks and inserts are one step and a run is never
//! visible without its children.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::model::{Artifact, Experiment, ExperimentId, Metric, NewRun, Parameter, Run, RunId};
use crate::storage_traits::{ExperimentRepository, StorageResult};

#[derive(Debug, Default)]
struct State {
    experiments: BTreeMap<i64, Experiment>,
    names: HashMap<String, i64>,
    // Children live inside the run entry; dropping a run drops them.
    runs: BTreeMap<i64, Run>,
    versions: HashMap<(i64, i64), i64>,
    next_experiment_id: i64,
    next_run_id: i64,
}

/// In-memory experiment repository. Ids start at 1 and increase by one.
#[derive(Debug, Default)]
pub struct MemoryExperimentRepository {
    state: Mutex<State>,
}

impl MemoryExperimentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed runs across all experiments.
    pub fn run_count(&self) -> usize {
        self.state().map(|s| s.runs.len()).unwrap_or(0)
    }

    /// Number of committed experiments.
    pub fn experiment_count(&self) -> usize {
        self.state().map(|s| s.experiments.len()).unwrap_or(0)
    }

    fn state(&self) -> StorageResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| StorageError::Backend(format!("memory store poisoned: {e}")))
    }
}

#[async_trait]
impl ExperimentRepository for MemoryExperimentRepository {
    async fn find_experiment_by_name(&self, name: &str) -> StorageResult<Option<Experiment>> {
        let state = self.state()?;
        Ok(state
            .names
            .get(name)
            .and_then(|id| state.experiments.get(id))
            .cloned())
    }

    async fn find_experiment_by_id(&self, id: ExperimentId) -> StorageResult<Option<Experiment>> {
        let state = self.state()?;
        Ok(state.experiments.get(&id.0).cloned())
    }

    async fn insert_experiment(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> StorageResult<Experiment> {
        let mut state = self.state()?;
        if state.names.contains_key(name) {
            return Err(StorageError::DuplicateExperimentName {
                name: name.to_string(),
            });
        }
        state.next_experiment_id += 1;
        let experiment = Experiment {
            id: ExperimentId(state.next_experiment_id),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        state.names.insert(experiment.name.clone(), experiment.id.0);
        state.experiments.insert(experiment.id.0, experiment.clone());
        Ok(experiment)
    }

    async fn list_run_versions(&self, experiment_id: ExperimentId) -> StorageResult<BTreeSet<i64>> {
        let state = self.state()?;
        Ok(state
            .runs
            .values()
            .filter(|r| r.experiment_id == experiment_id)
            .map(|r| r.version)
            .collect())
    }

    async fn insert_run_with_children(&self, run: NewRun) -> StorageResult<Run> {
        let mut state = self.state()?;
        let eid = run.experiment_id.0;
        if !state.experiments.contains_key(&eid) {
            return Err(StorageError::ExperimentNotFound { experiment_id: eid });
        }
        if state.versions.contains_key(&(eid, run.version)) {
            return Err(StorageError::DuplicateRunVersion {
                experiment_id: eid,
                version: run.version,
            });
        }

        let now = Utc::now();
        state.next_run_id += 1;
        let record = Run {
            id: RunId(state.next_run_id),
            experiment_id: run.experiment_id,
            version: run.version,
            status: run.status,
            started_at: now,
            parameters: run
                .parameters
                .into_iter()
                .map(|p| Parameter {
                    key: p.key,
                    value: p.value,
                })
                .collect(),
            metrics: run
                .metrics
                .into_iter()
                .map(|m| Metric {
                    key: m.key,
                    value: m.value,
                    timestamp: now,
                })
                .collect(),
            artifacts: run
                .artifacts
                .into_iter()
                .map(|a| Artifact {
                    file_path: a.file_path,
                    artifact_type: a.artifact_type,
                })
                .collect(),
        };
        state.versions.insert((eid, record.version), record.id.0);
        state.runs.insert(record.id.0, record.clone());
        Ok(record)
    }

    async fn get_run_with_children(&self, run_id: RunId) -> StorageResult<Option<Run>> {
        let state = self.state()?;
        Ok(state.runs.get(&run_id.0).cloned())
    }
}
