use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{config::JwtConfig, error::AppError};

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("invalid token")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // username
    pub iat: u64,
    pub nbf: u64,
    pub exp: u64,
}

/// Signing material built once from configuration and shared through state.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self::new(&cfg.secret, Duration::from_secs(cfg.ttl_seconds))
    }

    pub fn sign(&self, subject: &str) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
        let claims = Claims {
            sub: subject.to_owned(),
            iat: now,
            nbf: now,
            exp: now + self.ttl.as_secs(),
        };
        let token = self.encode_claims(&claims)?;
        debug!(subject, "jwt signed");
        Ok(token)
    }

    pub(crate) fn encode_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding).map_err(TokenError::Signing)
    }

    /// Checks signature, algorithm, `exp` and `nbf`; returns the subject.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_nbf = true;
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(TokenError::Invalid)?;
        debug!(subject = %data.claims.sub, "jwt verified");
        Ok(data.claims.sub)
    }
}

/// Username of the caller, taken from a valid `Authorization: Bearer` token.
#[derive(Debug)]
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let Some(header) = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            warn!("missing Authorization header");
            return Err(AppError::InvalidToken);
        };

        let Some(token) = header.strip_prefix("Bearer ") else {
            warn!("invalid Authorization scheme");
            return Err(AppError::InvalidToken);
        };

        match keys.verify(token.trim()) {
            Ok(subject) => Ok(AuthUser(subject)),
            Err(e) => {
                warn!(error = ?e, "invalid or expired token");
                Err(AppError::InvalidToken)
            }
        }
    }
}
