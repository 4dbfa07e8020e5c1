//! Boundary error for server actions. Whatever goes wrong below a handler
//! ends up here and is rendered as a failure envelope, never as a bare 500
//! page.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::{Ack, FieldErrors, TransitionError};
use thiserror::Error;

use crate::mailer::MailError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    AuthError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("Too many requests, please try again later")]
    RateLimited,

    #[error("Failed to send email: {0}")]
    Mail(#[from] MailError),

    #[error("File storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Transition(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Mail(_) | AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(errors) => Ack::invalid(errors),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                Ack::failed("Something went wrong, please try again")
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                Ack::failed("Something went wrong, please try again")
            }
            other => Ack::failed(other.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
