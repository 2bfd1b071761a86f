use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::{
    auth::{jwt::TokenError, password::PasswordError},
    response::{ErrorBody, Status},
    users::repo::StoreError,
};

/// Every failure a request can end in.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("user already exists")]
    DuplicateUsername,

    #[error("user not found")]
    NotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token")]
    InvalidToken,

    #[error("storage error")]
    Storage(#[source] sqlx::Error),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateUsername => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateUsername => AppError::DuplicateUsername,
            StoreError::NotFound => AppError::NotFound,
            StoreError::Database(e) => AppError::Storage(e),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid(_) => AppError::InvalidToken,
            TokenError::Signing(e) => AppError::Internal(anyhow::Error::new(e).context("sign token")),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(e: PasswordError) -> Self {
        AppError::Internal(anyhow::Error::new(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Storage(e) => error!(error = %e, "storage failure"),
            AppError::Internal(e) => error!(error = ?e, "internal failure"),
            _ => {}
        }

        let errors = match &self {
            AppError::Validation(errors) => errors.clone(),
            _ => Vec::new(),
        };
        let body = ErrorBody {
            status: Status::Error,
            error: self.to_string(),
            errors,
        };
        (self.status_code(), Json(body)).into_response()
    }
}
