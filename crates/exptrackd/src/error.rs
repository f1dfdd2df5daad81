//! HTTP error mapping.
//!
//! Registry errors become `{"error": <kind>, "detail": <message>}` with a
//! status chosen by [`ErrorKind`]. Requests that never reach the registry
//! (bad JSON, bad path segment) keep the extractor's own status.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use exptrack_core::{ErrorKind, RegistryError};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Registry(RegistryError),
    Malformed { status: StatusCode, detail: String },
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Malformed {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match self {
            ApiError::Registry(err) => {
                let kind = err.kind();
                (status_for(kind), kind.as_str(), err.to_string())
            }
            ApiError::Malformed { status, detail } => (status, "malformed_request", detail),
        };
        (status, Json(json!({ "error": kind, "detail": detail }))).into_response()
    }
}
