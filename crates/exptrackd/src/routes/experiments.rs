use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use exptrack_core::{Experiment, NewExperiment};

use super::AppState;
use crate::error::ApiError;

/// POST /experiments
pub async fn create_experiment(
    State(state): State<AppState>,
    payload: Result<Json<NewExperiment>, JsonRejection>,
) -> Result<(StatusCode, Json<Experiment>), ApiError> {
    let Json(input) = payload?;
    let experiment = state.service.create_experiment(input).await?;
    Ok((StatusCode::CREATED, Json(experiment)))
}
