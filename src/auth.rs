//! Bearer-token authentication.
//!
//! Tokens are minted elsewhere; this service only validates HS256 signatures
//! against the shared secret and extracts the caller's user id from `sub`.

use crate::{errors::AppError, state::AppState};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated user id.
    pub sub: String,
    /// Expiry as a unix timestamp.
    pub exp: usize,
}

/// The verified identity behind a request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Validate a bearer token and resolve it to an `AuthUser`.
pub fn authenticate(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|err| AppError::unauthorized(format!("invalid token: {}", err)))?;

    let user_id = Uuid::parse_str(&token_data.claims.sub)
        .map_err(|_| AppError::unauthorized("invalid user id in token"))?;
    Ok(AuthUser { user_id })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::unauthorized("missing authorization header"))?;
        let value = header
            .to_str()
            .map_err(|_| AppError::unauthorized("invalid authorization header"))?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthorized("expected a bearer token"))?;

        authenticate(token, &state.jwt_secret)
    }
}
