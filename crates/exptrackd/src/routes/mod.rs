pub mod experiments;
pub mod health;
pub mod runs;

use axum::routing::{get, post};
use axum::Router;
use exptrack_core::ExperimentService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: ExperimentService,
}

/// Build the application router with all API routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/experiments", post(experiments::create_experiment))
        .route("/runs", post(runs::create_run))
        .route("/runs/{run_id}", get(runs::get_run))
        .with_state(state)
}
