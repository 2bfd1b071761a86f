use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::AppError;

/// Field-level checks run after a body deserializes. Empty means valid.
pub trait Validate {
    fn validate(&self) -> Vec<String>;
}

/// JSON body that both deserialized and passed [`Validate`].
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            warn!(error = %e, "failed to decode request body");
            AppError::validation(format!("failed to decode request: {}", e.body_text()))
        })?;

        let errors = value.validate();
        if !errors.is_empty() {
            warn!(?errors, "invalid request");
            return Err(AppError::Validation(errors));
        }
        Ok(Self(value))
    }
}

/// The `{id}` path segment as a user id.
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                warn!(error = %e, "invalid id format");
                AppError::validation("invalid id format")
            })?;
        Ok(Self(id))
    }
}
