use crate::error::{AppError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
}

/// Verifies a bearer token minted by the auth service and returns its
/// claims. Both the HTTP extractor and the WebSocket handshake go
/// through here.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::AuthError)
}

/// Signs a short-lived token. Issuance is the auth service's job; this
/// exists for tests and local tooling that need a valid session.
pub fn sign_jwt(user_id: Uuid, secret: &str) -> Result<String> {
    let claims = Claims { sub: user_id, exp: (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp() };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|_| AppError::Internal)
}
