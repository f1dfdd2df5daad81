//! Entity model for the experiment/run registry
//!
//! ```text
//! Experiment (1) ──< Run (N)      unique (name), unique (experiment_id, version)
//!                     ├──< Parameter (N)   key/value, duplicates allowed
//!                     ├──< Metric (N)      append-only series per key
//!                     └──< Artifact (N)    opaque file reference
//! ```
//!
//! Persisted entities carry storage-assigned ids and timestamps. The `New*`
//! shapes are caller input and own the field-shape validation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Field-shape violations in caller input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("experiment name must not be empty")]
    EmptyExperimentName,

    #[error("run version must be positive, got {version}")]
    NonPositiveVersion { version: i64 },

    #[error("parameter #{index}: key must not be empty")]
    EmptyParameterKey { index: usize },

    #[error("parameter #{index} ('{key}'): value must not be empty")]
    EmptyParameterValue { index: usize, key: String },

    #[error("metric #{index}: key must not be empty")]
    EmptyMetricKey { index: usize },

    #[error("metric #{index} ('{key}'): value must be finite, got {value}")]
    NonFiniteMetric { index: usize, key: String, value: f64 },

    #[error("artifact #{index}: file_path must not be empty")]
    EmptyArtifactPath { index: usize },

    #[error("unknown run status '{0}' (expected running, completed, or failed)")]
    UnknownStatus(String),
}

/// Storage-assigned experiment identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub i64);

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage-assigned run identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub i64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a run.
///
/// The registry only writes the initial state; `running -> completed | failed`
/// transitions belong to whatever tracks execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// A named grouping of runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A static key/value input recorded for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

/// One timestamped observation in a run's metric series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Reference to a file produced by a run. The registry never dereferences it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub file_path: String,
    #[serde(rename = "type")]
    pub artifact_type: Option<String>,
}

/// A run together with every child recorded at its creation, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub experiment_id: ExperimentId,
    pub version: i64,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub parameters: Vec<Parameter>,
    pub metrics: Vec<Metric>,
    pub artifacts: Vec<Artifact>,
}

// ---------------------------------------------------------------------------
// Caller input
// ---------------------------------------------------------------------------

/// Input for experiment creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExperiment {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewExperiment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Names are compared exactly, so only a zero-length name is rejected.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyExperimentName);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewParameter {
    pub key: String,
    pub value: String,
}

impl NewParameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.key.is_empty() {
            return Err(ValidationError::EmptyParameterKey { index });
        }
        if self.value.is_empty() {
            return Err(ValidationError::EmptyParameterValue {
                index,
                key: self.key.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMetric {
    pub key: String,
    pub value: f64,
}

impl NewMetric {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.key.is_empty() {
            return Err(ValidationError::EmptyMetricKey { index });
        }
        if !self.value.is_finite() {
            return Err(ValidationError::NonFiniteMetric {
                index,
                key: self.key.clone(),
                value: self.value,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArtifact {
    pub file_path: String,
    #[serde(rename = "type", default)]
    pub artifact_type: Option<String>,
}

impl NewArtifact {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            artifact_type: None,
        }
    }

    pub fn with_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self
    }

    fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.file_path.is_empty() {
            return Err(ValidationError::EmptyArtifactPath { index });
        }
        Ok(())
    }
}

/// Input for run creation: the run plus every child committed with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub experiment_id: ExperimentId,
    pub version: i64,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub parameters: Vec<NewParameter>,
    #[serde(default)]
    pub metrics: Vec<NewMetric>,
    #[serde(default)]
    pub artifacts: Vec<NewArtifact>,
}

impl NewRun {
    pub fn new(experiment_id: ExperimentId, version: i64) -> Self {
        Self {
            experiment_id,
            version,
            status: RunStatus::Running,
            parameters: Vec::new(),
            metrics: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(NewParameter::new(key, value));
        self
    }

    pub fn metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.push(NewMetric::new(key, value));
        self
    }

    pub fn artifact(mut self, artifact: NewArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Check every child. Stops at the first violation; indices are zero-based
    /// within the child's own list.
    pub fn validate_children(&self) -> Result<(), ValidationError> {
        for (index, p) in self.parameters.iter().enumerate() {
            p.validate(index)?;
        }
        for (index, m) in self.metrics.iter().enumerate() {
            m.validate(index)?;
        }
        for (index, a) in self.artifacts.iter().enumerate() {
            a.validate(index)?;
        }
        Ok(())
    }

    /// Full shape check: positive version plus [`NewRun::validate_children`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_version(self.version)?;
        self.validate_children()
    }
}

/// Versions are caller-chosen; only positivity is a shape rule.
pub fn validate_version(version: i64) -> Result<(), ValidationError> {
    if version <= 0 {
        return Err(ValidationError::NonPositiveVersion { version });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_experiment_name_rejected() {
        assert_eq!(
            NewExperiment::new("").validate(),
            Err(ValidationError::EmptyExperimentName)
        );
        assert!(NewExperiment::new(" ").validate().is_ok());
    }

    #[test]
    fn version_must_be_positive() {
        assert!(validate_version(1).is_ok());
        assert_eq!(
            validate_version(0),
            Err(ValidationError::NonPositiveVersion { version: 0 })
        );
        assert!(validate_version(-4).is_err());
    }

    #[test]
    fn children_report_offending_index() {
        let run = NewRun::new(ExperimentId(1), 1)
            .param("lr", "0.01")
            .param("batch", "");
        assert_eq!(
            run.validate_children(),
            Err(ValidationError::EmptyParameterValue {
                index: 1,
                key: "batch".to_string()
            })
        );
    }

    #[test]
    fn non_finite_metric_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let run = NewRun::new(ExperimentId(1), 1).metric("loss", bad);
            assert!(matches!(
                run.validate_children(),
                Err(ValidationError::NonFiniteMetric { index: 0, .. })
            ));
        }
    }

    #[test]
    fn empty_artifact_path_rejected() {
        let run = NewRun::new(ExperimentId(1), 1).artifact(NewArtifact::new(""));
        assert_eq!(
            run.validate_children(),
            Err(ValidationError::EmptyArtifactPath { index: 0 })
        );
    }

    #[test]
    fn status_parses_lowercase_only() {
        assert_eq!("failed".parse::<RunStatus>(), Ok(RunStatus::Failed));
        assert!(matches!(
            "Running".parse::<RunStatus>(),
            Err(ValidationError::UnknownStatus(_))
        ));
    }

    #[test]
    fn run_request_defaults_optional_lists() {
        let run: NewRun =
            serde_json::from_value(serde_json::json!({"experiment_id": 3, "version": 2}))
                .unwrap();
        assert_eq!(run.experiment_id, ExperimentId(3));
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.parameters.is_empty() && run.metrics.is_empty() && run.artifacts.is_empty());
    }

    #[test]
    fn artifact_type_uses_wire_name() {
        let a = Artifact {
            file_path: "s3://bucket/model.pt".to_string(),
            artifact_type: Some("model".to_string()),
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "model");
    }
}
