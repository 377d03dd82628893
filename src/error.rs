use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

use crate::domain::JobStatus;
use crate::store::StoreError;

/// Failures of the booking engine's public operations.
///
/// Lost accept races and rejected admin edits are not errors; they come back
/// as `AcceptOutcome` / `StatusChange` values.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("missing or invalid field: {field}")]
    Validation { field: &'static str, message: String },

    #[error("{message}")]
    Policy { message: String },

    #[error("not allowed: {0}")]
    Forbidden(&'static str),

    #[error("transition from {from} to {to} is not allowed")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    field: Option<&'static str>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            field: self.field,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl From<BookingError> for AppError {
    fn from(value: BookingError) -> Self {
        match value {
            BookingError::NotFound(what) => {
                AppError::new(StatusCode::NOT_FOUND, format!("{what} not found"))
            }
            BookingError::Validation { field, message } => AppError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message,
                field: Some(field),
            },
            BookingError::Policy { message } => AppError::new(StatusCode::CONFLICT, message),
            BookingError::Forbidden(reason) => AppError::new(StatusCode::FORBIDDEN, reason),
            err @ BookingError::InvalidTransition { .. } => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            BookingError::Store(err) => {
                tracing::error!(error = %err, "store failure");
                AppError::internal(err)
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}
