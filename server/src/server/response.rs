//! Error responses

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::FleetError;

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// HTTP status for an error kind
pub fn status_for(err: &FleetError) -> StatusCode {
    match err {
        FleetError::AgentNotFound(_)
        | FleetError::TaskNotFound(_)
        | FleetError::DeploymentNotFound(_) => StatusCode::NOT_FOUND,
        FleetError::AgentOffline { .. } => StatusCode::PRECONDITION_FAILED,
        FleetError::InvalidTransition { .. }
        | FleetError::DeploymentBusy { .. }
        | FleetError::UpdateInProgress(_) => StatusCode::CONFLICT,
        FleetError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for FleetError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(code = self.code(), "Request failed: {}", self);
        }
        (status, Json(ErrorBody::new(self.to_string(), self.code()))).into_response()
    }
}
