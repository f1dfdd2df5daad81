//! Row definitions for the exptrack SurrealDB tables
//!
//! Tables:
//! - experiments: named groupings, unique by name
//! - runs: versioned executions, unique by (experiment_id, version)
//! - parameters / metrics / artifacts: run children, ordered by `seq`
//!
//! Rows carry plain integer ids (`experiment_id`, `run_id`) allocated from the
//! `counters` table; SurrealDB's own record id is kept only as `id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::model::{
    Artifact, Experiment, ExperimentId, Metric, NewArtifact, NewMetric, NewParameter, Parameter,
    Run, RunId, RunStatus,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Experiment row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRow {
    /// SurrealDB record ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub experiment_id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<ExperimentRow> for Experiment {
    fn from(row: ExperimentRow) -> Self {
        Experiment {
            id: ExperimentId(row.experiment_id),
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

/// Run row (children are stored in their own tables)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: i64,
    pub experiment_id: i64,
    pub version: i64,
    /// One of "running", "completed", "failed"
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub started_at: DateTime<Utc>,
}

impl RunRow {
    /// Attach children and convert into the domain type.
    pub fn into_run(
        self,
        parameters: Vec<ParameterRow>,
        metrics: Vec<MetricRow>,
        artifacts: Vec<ArtifactRow>,
    ) -> Result<Run, StorageError> {
        let status = self.status.parse::<RunStatus>().map_err(|_| {
            StorageError::Backend(format!(
                "run {} has unknown status: {}",
                self.run_id, self.status
            ))
        })?;
        Ok(Run {
            id: RunId(self.run_id),
            experiment_id: ExperimentId(self.experiment_id),
            version: self.version,
            status,
            started_at: self.started_at,
            parameters: parameters.into_iter().map(Parameter::from).collect(),
            metrics: metrics.into_iter().map(Metric::from).collect(),
            artifacts: artifacts.into_iter().map(Artifact::from).collect(),
        })
    }
}

/// Parameter row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: i64,
    /// Position within the run's parameter list
    pub seq: i64,
    pub key: String,
    pub value: String,
}

impl From<ParameterRow> for Parameter {
    fn from(row: ParameterRow) -> Self {
        Parameter {
            key: row.key,
            value: row.value,
        }
    }
}

/// Metric row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: i64,
    pub seq: i64,
    pub key: String,
    pub value: f64,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl From<MetricRow> for Metric {
    fn from(row: MetricRow) -> Self {
        Metric {
            key: row.key,
            value: row.value,
            timestamp: row.timestamp,
        }
    }
}

/// Artifact row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: i64,
    pub seq: i64,
    pub file_path: String,
    pub artifact_type: Option<String>,
}

impl From<ArtifactRow> for Artifact {
    fn from(row: ArtifactRow) -> Self {
        Artifact {
            file_path: row.file_path,
            artifact_type: row.artifact_type,
        }
    }
}

// ---------------------------------------------------------------------------
// Pending children: bound into the insert transaction before the run id exists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PendingParameter {
    pub seq: i64,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingMetric {
    pub seq: i64,
    pub key: String,
    pub value: f64,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingArtifact {
    pub seq: i64,
    pub file_path: String,
    pub artifact_type: Option<String>,
}

pub fn pending_parameters(params: Vec<NewParameter>) -> Vec<PendingParameter> {
    params
        .into_iter()
        .zip(0i64..)
        .map(|(p, seq)| PendingParameter {
            seq,
            key: p.key,
            value: p.value,
        })
        .collect()
}

/// Every metric in one insert shares the same timestamp.
pub fn pending_metrics(metrics: Vec<NewMetric>, timestamp: DateTime<Utc>) -> Vec<PendingMetric> {
    metrics
        .into_iter()
        .zip(0i64..)
        .map(|(m, seq)| PendingMetric {
            seq,
            key: m.key,
            value: m.value,
            timestamp,
        })
        .collect()
}

pub fn pending_artifacts(artifacts: Vec<NewArtifact>) -> Vec<PendingArtifact> {
    artifacts
        .into_iter()
        .zip(0i64..)
        .map(|(a, seq)| PendingArtifact {
            seq,
            file_path: a.file_path,
            artifact_type: a.artifact_type,
        })
        .collect()
}
