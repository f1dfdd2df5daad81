use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use exptrack_core::{
    ExperimentId, NewArtifact, NewMetric, NewParameter, NewRun, RegistryError, Run, RunId,
    RunStatus,
};
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

/// Body of `POST /runs`. `status` stays a string here so an unknown value is
/// reported as a validation error rather than a JSON shape error.
#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub experiment_id: i64,
    pub version: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub parameters: Vec<NewParameter>,
    #[serde(default)]
    pub metrics: Vec<NewMetric>,
    #[serde(default)]
    pub artifacts: Vec<NewArtifact>,
}

impl TryFrom<CreateRunRequest> for NewRun {
    type Error = RegistryError;

    fn try_from(req: CreateRunRequest) -> Result<Self, Self::Error> {
        let status = match req.status.as_deref() {
            Some(raw) => raw.parse::<RunStatus>()?,
            None => RunStatus::default(),
        };
        Ok(NewRun {
            experiment_id: ExperimentId(req.experiment_id),
            version: req.version,
            status,
            parameters: req.parameters,
            metrics: req.metrics,
            artifacts: req.artifacts,
        })
    }
}

/// POST /runs
pub async fn create_run(
    State(state): State<AppState>,
    payload: Result<Json<CreateRunRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Run>), ApiError> {
    let Json(req) = payload?;
    let run = state.service.create_run(NewRun::try_from(req)?).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

/// GET /runs/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    run_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Run>, ApiError> {
    let Path(run_id) = run_id?;
    let run = state.service.get_run(RunId(run_id)).await?;
    Ok(Json(run))
}
