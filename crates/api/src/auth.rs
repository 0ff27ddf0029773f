//! Request authentication
//!
//! Bearer tokens are HS256 JWTs issued by the account provider and verified
//! against the shared signing secret. Verified identity is inserted as an
//! [`AuthUser`] extension; handlers never read user IDs from request bodies.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// JWT claims carried by account-provider tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account-provider user ID)
    pub sub: String,
    /// Email, when the provider includes it
    pub email: Option<String>,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// Authenticated user extracted from a verified token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Shared state for the auth middleware
#[derive(Clone)]
pub struct AuthState {
    decoding_key: DecodingKey,
}

impl AuthState {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validate a bearer token and extract its claims
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        // Explicit algorithm prevents algorithm confusion attacks
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token validation failed");
            ApiError::InvalidToken
        })?;

        Ok(data.claims)
    }
}

/// Middleware that requires a valid bearer token
pub async fn require_auth(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = auth.verify_token(token)?;

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use time::{Duration, OffsetDateTime};

    const SECRET: &str = "test-jwt-secret-must-be-at-least-32-characters-long";

    fn make_token(secret: &str, exp_offset: Duration) -> String {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: "user_2abc".to_string(),
            email: Some("founder@example.com".to_string()),
            iat: now.unix_timestamp(),
            exp: (now + exp_offset).unix_timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_accepted() {
        let auth = AuthState::new(SECRET);
        let token = make_token(SECRET, Duration::hours(1));

        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user_2abc");
        assert_eq!(claims.email.as_deref(), Some("founder@example.com"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = AuthState::new(SECRET);
        let token = make_token(SECRET, Duration::hours(-1));

        assert!(matches!(
            auth.verify_token(&token),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let auth = AuthState::new(SECRET);
        let token = make_token("another-secret-that-is-also-32-characters", Duration::hours(1));

        assert!(matches!(
            auth.verify_token(&token),
            Err(ApiError::InvalidToken)
        ));
    }
}
