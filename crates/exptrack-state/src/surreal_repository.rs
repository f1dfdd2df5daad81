//! SurrealDB-backed ExperimentRepository implementation
//!
//! Uses the row types in `schema` for persistence, converting to/from the
//! entity model at the boundary. Uniqueness is left to the indexes defined in
//! `migrations`; this adapter only translates their violations.

use std::collections::BTreeSet;
use std::future::IntoFuture;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Response;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::migrations::{IDX_EXPERIMENT_NAME, IDX_RUN_EXPERIMENT_VERSION};
use crate::model::{Experiment, ExperimentId, NewRun, Run, RunId};
use crate::schema::{
    pending_artifacts, pending_metrics, pending_parameters, ArtifactRow, ExperimentRow,
    MetricRow, ParameterRow, RunRow,
};
use crate::storage_traits::{ExperimentRepository, StorageResult};

/// Marker thrown inside the run insert when the parent experiment is absent.
const EXPERIMENT_MISSING: &str = "experiment_missing";

/// Upper bound on attempts for a write that keeps losing commit races.
const MAX_COMMIT_ATTEMPTS: u32 = 32;

/// SurrealDB's optimistic transactions abort the losers of a write race with
/// this wording; the transaction left no trace and can simply run again.
fn is_retryable(message: &str) -> bool {
    message.contains("can be retried") || message.contains("read or write conflict")
}

/// Short, growing pause between attempts, with a little jitter so writers
/// that collided once do not line up again.
fn retry_delay(attempt: u32) -> Duration {
    let base = u64::from(attempt).saturating_mul(2).min(20);
    let jitter = u64::from(Utc::now().timestamp_subsec_nanos() % 3);
    Duration::from_millis(base + jitter)
}

const INSERT_EXPERIMENT: &str = r#"
    BEGIN TRANSACTION;
    LET $experiment_id = (UPSERT ONLY counters:experiments SET value += 1 RETURN VALUE value);
    CREATE experiments CONTENT {
        experiment_id: $experiment_id,
        name: $name,
        description: $description,
        created_at: $created_at,
    };
    COMMIT TRANSACTION;
"#;

const INSERT_RUN_WITH_CHILDREN: &str = r#"
    BEGIN TRANSACTION;
    IF array::len((SELECT experiment_id FROM experiments WHERE experiment_id = $experiment_id)) = 0 {
        THROW "experiment_missing";
    };
    LET $run_id = (UPSERT ONLY counters:runs SET value += 1 RETURN VALUE value);
    CREATE runs CONTENT {
        run_id: $run_id,
        experiment_id: $experiment_id,
        version: $version,
        status: $status,
        started_at: $started_at,
    };
    FOR $p IN $parameters {
        CREATE parameters CONTENT {
            run_id: $run_id,
            seq: $p.seq,
            key: $p.key,
            value: $p.value,
        };
    };
    FOR $m IN $metrics {
        CREATE metrics CONTENT {
            run_id: $run_id,
            seq: $m.seq,
            key: $m.key,
            value: $m.value,
            timestamp: $m.timestamp,
        };
    };
    FOR $a IN $artifacts {
        CREATE artifacts CONTENT {
            run_id: $run_id,
            seq: $a.seq,
            file_path: $a.file_path,
            artifact_type: $a.artifact_type,
        };
    };
    COMMIT TRANSACTION;
"#;

const SELECT_RUN_WITH_CHILDREN: &str = r#"
    SELECT * FROM runs WHERE run_id = $run_id;
    SELECT * FROM parameters WHERE run_id = $run_id ORDER BY seq ASC;
    SELECT * FROM metrics WHERE run_id = $run_id ORDER BY seq ASC;
    SELECT * FROM artifacts WHERE run_id = $run_id ORDER BY seq ASC;
"#;

/// SurrealDB-backed implementation of [`ExperimentRepository`].
#[derive(Clone)]
pub struct SurrealExperimentRepository {
    handle: SurrealHandle,
}

impl SurrealExperimentRepository {
    pub fn new(handle: SurrealHandle) -> Self {
        Self { handle }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let handle = SurrealHandle::setup_db().await?;
        info!("SurrealExperimentRepository connected (in-memory)");
        Ok(Self::new(handle))
    }

    /// Create from environment variables.
    ///
    /// Uses the same env-var chain as [`SurrealHandle::setup_from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(SurrealHandle::setup_from_env().await?))
    }

    pub fn handle(&self) -> &SurrealHandle {
        &self.handle
    }

    // -- private helpers -----------------------------------------------------

    /// Await a query under the handle's timeout.
    async fn execute<Q>(&self, operation: &str, query: Q) -> StorageResult<Response>
    where
        Q: IntoFuture<Output = surrealdb::Result<Response>> + Send,
        Q::IntoFuture: Send,
    {
        let bound: Duration = self.handle.query_timeout();
        match tokio::time::timeout(bound, query).await {
            Ok(result) => result.map_err(|e| StorageError::Backend(e.to_string())),
            Err(_) => {
                warn!(operation, after_ms = bound.as_millis() as u64, "storage query timed out");
                Err(StorageError::Timeout {
                    operation: operation.to_string(),
                    after_ms: bound.as_millis() as u64,
                })
            }
        }
    }

    /// Statement error messages in statement order; empty if all succeeded.
    fn statement_errors(response: &mut Response) -> Vec<String> {
        let mut errors: Vec<(usize, surrealdb::Error)> = response.take_errors().into_iter().collect();
        errors.sort_by_key(|(idx, _)| *idx);
        errors.into_iter().map(|(_, e)| e.to_string()).collect()
    }

    /// Pick the most specific error from a failed transaction. Statements that
    /// were merely rolled back report a generic message; the one that caused
    /// the rollback carries the index name or thrown marker.
    fn classify(errors: &[String], run: Option<(i64, i64)>, name: Option<&str>) -> StorageError {
        if let Some((experiment_id, version)) = run {
            if errors.iter().any(|e| e.contains(IDX_RUN_EXPERIMENT_VERSION)) {
                return StorageError::DuplicateRunVersion {
                    experiment_id,
                    version,
                };
            }
            if errors.iter().any(|e| e.contains(EXPERIMENT_MISSING)) {
                return StorageError::ExperimentNotFound { experiment_id };
            }
        }
        if let Some(name) = name {
            if errors.iter().any(|e| e.contains(IDX_EXPERIMENT_NAME)) {
                return StorageError::DuplicateExperimentName {
                    name: name.to_string(),
                };
            }
        }
        // A rolled-back statement without detail carries the shortest message.
        let cause = errors
            .iter()
            .find(|e| !e.contains("not executed"))
            .or_else(|| errors.iter().max_by_key(|e| e.len()))
            .cloned()
            .unwrap_or_else(|| "unknown transaction failure".to_string());
        StorageError::Backend(cause)
    }

    /// Run a write transaction to completion.
    ///
    /// Every insert bumps a shared counter record, so concurrent writers
    /// routinely abort each other at commit. Those aborts are retried; a
    /// constraint violation or thrown marker is returned as soon as it shows.
    async fn commit<F, Q>(
        &self,
        operation: &str,
        build: F,
        run: Option<(i64, i64)>,
        name: Option<&str>,
    ) -> StorageResult<()>
    where
        F: Fn() -> Q + Send + Sync,
        Q: IntoFuture<Output = surrealdb::Result<Response>> + Send,
        Q::IntoFuture: Send,
    {
        let mut attempt = 1;
        loop {
            let errors = match self.execute(operation, build()).await {
                Ok(mut res) => Self::statement_errors(&mut res),
                Err(StorageError::Backend(message)) => vec![message],
                Err(e) => return Err(e),
            };
            if errors.is_empty() {
                return Ok(());
            }

            let err = Self::classify(&errors, run, name);
            let retryable =
                matches!(err, StorageError::Backend(_)) && errors.iter().any(|e| is_retryable(e));
            if !retryable || attempt >= MAX_COMMIT_ATTEMPTS {
                return Err(err);
            }
            debug!(operation, attempt, "transaction conflict, retrying");
            tokio::time::sleep(retry_delay(attempt)).await;
            attempt += 1;
        }
    }

    async fn select_experiment(
        &self,
        operation: &str,
        sql: &'static str,
        field: &'static str,
        value: serde_json::Value,
    ) -> StorageResult<Option<Experiment>> {
        let mut res = self
            .execute(operation, self.handle.db().query(sql).bind((field, value)))
            .await?;
        let rows: Vec<ExperimentRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next().map(Experiment::from))
    }
}

#[async_trait]
impl ExperimentRepository for SurrealExperimentRepository {
    async fn find_experiment_by_name(&self, name: &str) -> StorageResult<Option<Experiment>> {
        self.select_experiment(
            "find_experiment_by_name",
            "SELECT * FROM experiments WHERE name = $name",
            "name",
            serde_json::Value::String(name.to_string()),
        )
        .await
    }

    async fn find_experiment_by_id(&self, id: ExperimentId) -> StorageResult<Option<Experiment>> {
        self.select_experiment(
            "find_experiment_by_id",
            "SELECT * FROM experiments WHERE experiment_id = $experiment_id",
            "experiment_id",
            serde_json::Value::from(id.0),
        )
        .await
    }

    async fn insert_experiment(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> StorageResult<Experiment> {
        debug!(name, "inserting experiment");

        let created_at = SurrealDatetime::from(Utc::now());
        self.commit(
            "insert_experiment",
            || {
                self.handle
                    .db()
                    .query(INSERT_EXPERIMENT)
                    .bind(("name", name.to_string()))
                    .bind(("description", description.map(str::to_string)))
                    .bind(("created_at", created_at.clone()))
            },
            None,
            Some(name),
        )
        .await?;

        self.find_experiment_by_name(name).await?.ok_or_else(|| {
            StorageError::Backend(format!("experiment '{name}' missing after commit"))
        })
    }

    async fn list_run_versions(&self, experiment_id: ExperimentId) -> StorageResult<BTreeSet<i64>> {
        let query = self
            .handle
            .db()
            .query("SELECT VALUE version FROM runs WHERE experiment_id = $experiment_id")
            .bind(("experiment_id", experiment_id.0));
        let mut res = self.execute("list_run_versions", query).await?;
        let versions: Vec<i64> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(versions.into_iter().collect())
    }

    async fn insert_run_with_children(&self, run: NewRun) -> StorageResult<Run> {
        let experiment_id = run.experiment_id.0;
        let version = run.version;
        let now = Utc::now();

        debug!(
            experiment_id,
            version,
            parameters = run.parameters.len(),
            metrics = run.metrics.len(),
            artifacts = run.artifacts.len(),
            "inserting run with children"
        );

        let status = run.status.as_str();
        let parameters = pending_parameters(run.parameters);
        let metrics = pending_metrics(run.metrics, now);
        let artifacts = pending_artifacts(run.artifacts);
        self.commit(
            "insert_run_with_children",
            || {
                self.handle
                    .db()
                    .query(INSERT_RUN_WITH_CHILDREN)
                    .bind(("experiment_id", experiment_id))
                    .bind(("version", version))
                    .bind(("status", status.to_string()))
                    .bind(("started_at", SurrealDatetime::from(now)))
                    .bind(("parameters", parameters.clone()))
                    .bind(("metrics", metrics.clone()))
                    .bind(("artifacts", artifacts.clone()))
            },
            Some((experiment_id, version)),
            None,
        )
        .await?;

        let lookup = self
            .handle
            .db()
            .query("SELECT VALUE run_id FROM runs WHERE experiment_id = $experiment_id AND version = $version")
            .bind(("experiment_id", experiment_id))
            .bind(("version", version));
        let mut res = self.execute("insert_run_with_children", lookup).await?;
        let ids: Vec<i64> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let run_id = ids.into_iter().next().ok_or_else(|| {
            StorageError::Backend(format!(
                "run version {version} of experiment {experiment_id} missing after commit"
            ))
        })?;

        self.get_run_with_children(RunId(run_id))
            .await?
            .ok_or_else(|| StorageError::Backend(format!("run {run_id} missing after commit")))
    }

    async fn get_run_with_children(&self, run_id: RunId) -> StorageResult<Option<Run>> {
        let query = self
            .handle
            .db()
            .query(SELECT_RUN_WITH_CHILDREN)
            .bind(("run_id", run_id.0));
        let mut res = self.execute("get_run_with_children", query).await?;

        let backend = |e: surrealdb::Error| StorageError::Backend(e.to_string());
        let runs: Vec<RunRow> = res.take(0).map_err(backend)?;
        let Some(row) = runs.into_iter().next() else {
            return Ok(None);
        };
        let parameters: Vec<ParameterRow> = res.take(1).map_err(backend)?;
        let metrics: Vec<MetricRow> = res.take(2).map_err(backend)?;
        let artifacts: Vec<ArtifactRow> = res.take(3).map_err(backend)?;

        row.into_run(parameters, metrics, artifacts).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewArtifact;

    #[test]
    fn classify_prefers_the_index_violation_over_rollback_noise() {
        let errors = vec![
            "The query was not executed due to a failed transaction".to_string(),
            format!(
                "Database index `{IDX_RUN_EXPERIMENT_VERSION}` already contains [1, 1], with record `runs:abc`"
            ),
        ];
        let err = SurrealExperimentRepository::classify(&errors, Some((1, 1)), None);
        assert_eq!(
            err,
            StorageError::DuplicateRunVersion {
                experiment_id: 1,
                version: 1
            }
        );
    }

    #[test]
    fn classify_maps_thrown_marker_to_missing_experiment() {
        let errors = vec![format!("An error occurred: {EXPERIMENT_MISSING}")];
        let err = SurrealExperimentRepository::classify(&errors, Some((9, 1)), None);
        assert_eq!(err, StorageError::ExperimentNotFound { experiment_id: 9 });
    }

    #[test]
    fn classify_falls_back_to_backend() {
        let errors = vec![
            "The query was not executed due to a failed transaction".to_string(),
            "Found 'x' for field `value`".to_string(),
        ];
        let err = SurrealExperimentRepository::classify(&errors, None, Some("exp"));
        assert_eq!(err, StorageError::Backend("Found 'x' for field `value`".to_string()));
    }

    #[test]
    fn commit_conflicts_are_retryable_but_index_violations_are_not() {
        assert!(is_retryable(
            "Failed to commit transaction due to a read or write conflict. This transaction can be retried"
        ));
        assert!(!is_retryable(&format!(
            "Database index `{IDX_EXPERIMENT_NAME}` already contains 'exp'"
        )));
        assert!(!is_retryable(EXPERIMENT_MISSING));
    }

    #[test]
    fn retry_delay_stays_short() {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            assert!(retry_delay(attempt) <= Duration::from_millis(22));
        }
    }

    #[tokio::test]
    async fn stalled_query_surfaces_as_timeout() {
        let handle = SurrealHandle::setup_db()
            .await
            .unwrap()
            .with_query_timeout(Duration::from_millis(20));
        let repo = SurrealExperimentRepository::new(handle);

        let err = repo
            .execute(
                "stalled_query",
                std::future::pending::<surrealdb::Result<Response>>(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StorageError::Timeout {
                operation: "stalled_query".to_string(),
                after_ms: 20
            }
        );
    }

    #[tokio::test]
    async fn stalled_write_is_not_retried() {
        let handle = SurrealHandle::setup_db()
            .await
            .unwrap()
            .with_query_timeout(Duration::from_millis(20));
        let repo = SurrealExperimentRepository::new(handle);

        let err = repo
            .commit(
                "stalled_write",
                std::future::pending::<surrealdb::Result<Response>>,
                None,
                Some("exp"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Timeout { .. }));
    }

    #[tokio::test]
    async fn deleting_a_run_cascades_to_its_children() {
        let repo = SurrealExperimentRepository::in_memory().await.unwrap();
        let exp = repo.insert_experiment("cascade", None).await.unwrap();
        let run = repo
            .insert_run_with_children(
                NewRun::new(exp.id, 1)
                    .param("lr", "0.1")
                    .metric("loss", 0.5)
                    .artifact(NewArtifact::new("out/model.bin")),
            )
            .await
            .unwrap();

        repo.handle()
            .db()
            .query("DELETE runs WHERE run_id = $run_id")
            .bind(("run_id", run.id.0))
            .await
            .unwrap();

        let mut res = repo
            .handle()
            .db()
            .query("SELECT * FROM parameters WHERE run_id = $run_id; SELECT * FROM metrics WHERE run_id = $run_id; SELECT * FROM artifacts WHERE run_id = $run_id;")
            .bind(("run_id", run.id.0))
            .await
            .unwrap();
        let params: Vec<ParameterRow> = res.take(0).unwrap();
        let metrics: Vec<MetricRow> = res.take(1).unwrap();
        let artifacts: Vec<ArtifactRow> = res.take(2).unwrap();
        assert!(params.is_empty());
        assert!(metrics.is_empty());
        assert!(artifacts.is_empty());
        assert!(repo.get_run_with_children(run.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_insert_leaves_counters_untouched() {
        let repo = SurrealExperimentRepository::in_memory().await.unwrap();
        let exp = repo.insert_experiment("ids", None).await.unwrap();
        let first = repo
            .insert_run_with_children(NewRun::new(exp.id, 1))
            .await
            .unwrap();
        repo.insert_run_with_children(NewRun::new(exp.id, 1))
            .await
            .unwrap_err();
        let second = repo
            .insert_run_with_children(NewRun::new(exp.id, 2))
            .await
            .unwrap();
        assert_eq!(second.id.0, first.id.0 + 1);
    }
}
