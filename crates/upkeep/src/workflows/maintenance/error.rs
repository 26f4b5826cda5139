use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::repository::RepositoryError;

/// Error raised by the maintenance marketplace.
///
/// Everything except `Repository` is an expected outcome the caller can act on; none of them are
/// retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaintenanceError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("payment has not been completed yet")]
    PaymentNotCompleted,
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl MaintenanceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized(_) => "unauthorized",
            Self::Validation(_) => "validation",
            Self::CapacityExceeded(_) => "capacity_exceeded",
            Self::PaymentNotCompleted => "payment_not_completed",
            Self::InvalidState(_) => "invalid_state",
            Self::Repository(_) => "internal",
        }
    }
}

impl From<RepositoryError> for MaintenanceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            // Version checks and uniqueness constraints only fail when another writer got there
            // first, which callers see as an ordinary conflict.
            RepositoryError::Conflict => {
                Self::Conflict("record was modified concurrently".to_string())
            }
            other => Self::Repository(other),
        }
    }
}

impl MaintenanceError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::CapacityExceeded(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PaymentNotCompleted => StatusCode::PAYMENT_REQUIRED,
            Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MaintenanceError {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (self.status_code(), Json(payload)).into_response()
    }
}
