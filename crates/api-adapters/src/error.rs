//! Maps engine errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use domains::DomainError;

use crate::dto::ErrorResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("metrics encoding failed")]
    Metrics(#[from] std::fmt::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Domain(e) => match e {
                DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                DomainError::Forbidden(_) | DomainError::Ineligible(_) => StatusCode::FORBIDDEN,
                DomainError::Conflict(_) | DomainError::DuplicateClaim { .. } => StatusCode::CONFLICT,
                DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
                DomainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Domain(e) => domain_code(e),
            ApiError::Metrics(_) => "INTERNAL_ERROR",
        }
    }
}

/// Stable machine-readable code for each error kind.
pub fn domain_code(e: &DomainError) -> &'static str {
    match e {
        DomainError::Unauthorized(_) => "UNAUTHORIZED",
        DomainError::Forbidden(_) => "FORBIDDEN",
        DomainError::Ineligible(_) => "INELIGIBLE",
        DomainError::Conflict(_) => "CONFLICT",
        DomainError::DuplicateClaim { .. } => "DUPLICATE_CLAIM",
        DomainError::InvalidInput(_) => "INVALID_INPUT",
        DomainError::NotFound { .. } => "NOT_FOUND",
        DomainError::Storage(_) => "STORAGE_ERROR",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Domain(DomainError::Storage(detail)) => {
                error!(%detail, "storage failure while handling request");
                "internal storage error".to_string()
            }
            ApiError::Domain(DomainError::DuplicateClaim { .. }) => {
                "a claim for this character and thread has already been submitted".to_string()
            }
            ApiError::Metrics(e) => {
                error!(error = %e, "metrics encoding failed");
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}
