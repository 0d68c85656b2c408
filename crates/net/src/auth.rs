//! Bearer-token sessions: JWT issue/verify and the request extractors.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use voxen_database::SafeDatabase;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // wallet address
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(secret: &str, address: &str, now: DateTime<Utc>, ttl: Duration) -> Result<String, ApiError> {
    let claims = Claims {
        sub: address.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ApiError::Internal(format!("JWT encoding failed: {}", e)))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthorized("Invalid or expired token"))
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The authenticated caller. Rejects with 401 when the token is missing or invalid.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub address: String,
}

impl<D: SafeDatabase> FromRequestParts<AppState<D>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState<D>) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        let claims = verify_token(&state.config.jwt_secret, token)?;
        Ok(AuthUser { address: claims.sub })
    }
}

/// Optional caller for public endpoints whose output depends on who asks.
/// A bad token is treated like no token.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<String>);

impl MaybeAuthUser {
    pub fn address(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<D: SafeDatabase> FromRequestParts<AppState<D>> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState<D>) -> Result<Self, Self::Rejection> {
        let address = bearer(parts)
            .and_then(|token| verify_token(&state.config.jwt_secret, token).ok())
            .map(|claims| claims.sub);
        Ok(MaybeAuthUser(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_token_round_trip() {
        let token = issue_token(SECRET, "0xabc", Utc::now(), Duration::hours(1)).unwrap();
        assert_eq!(verify_token(SECRET, &token).unwrap().sub, "0xabc");
    }

    #[test]
    fn test_expired_token_rejected() {
        let issued = Utc::now() - Duration::hours(3);
        let token = issue_token(SECRET, "0xabc", issued, Duration::hours(1)).unwrap();
        assert!(matches!(verify_token(SECRET, &token), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(SECRET, "0xabc", Utc::now(), Duration::hours(1)).unwrap();
        assert!(verify_token("another-secret-another-secret-xx", &token).is_err());
    }
}
