//! Contact form route

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use growth_shared::RateLimitConfig;

use crate::{error::ApiError, routes::extract_client_ip, state::AppState};

const HOUR_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

impl ContactRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty()
            || self.email.trim().is_empty()
            || self.message.trim().is_empty()
        {
            return Err(ApiError::Validation(
                "name, email and message are required".to_string(),
            ));
        }
        if !self.email.contains('@') {
            return Err(ApiError::Validation("Invalid email address".to_string()));
        }
        Ok(())
    }
}

/// Submit a contact-form message, limited per client IP
pub async fn submit_contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ContactRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    request.validate()?;

    let client_ip = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    let config = RateLimitConfig {
        max_requests: state.config.contact_max_per_hour,
        window_ms: HOUR_MS,
    };

    let decision = state.contact_limiter.check(&client_ip, &config).await;
    if !decision.allowed {
        let minutes = (decision.retry_after_ms / 60_000).max(1);
        tracing::info!(client_ip = %client_ip, "Contact form rate limited");
        return Err(ApiError::TooManyRequests(format!(
            "Too many messages. Try again in {} minutes.",
            minutes
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO contact_messages (name, email, message, client_ip)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(request.name.trim())
    .bind(request.email.trim())
    .bind(request.message.trim())
    .bind(&client_ip)
    .execute(&state.pool)
    .await?;

    tracing::info!(client_ip = %client_ip, "Contact message stored");

    Ok((StatusCode::CREATED, Json(json!({"received": true}))))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn test_validation_requires_all_fields() {
        let request = ContactRequest {
            name: "Ada".to_string(),
            email: String::new(),
            message: "Hello".to_string(),
        };
        assert!(matches!(
            request.validate(),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_email() {
        let request = ContactRequest {
            name: "Ada".to_string(),
            email: "not-an-email".to_string(),
            message: "Hello".to_string(),
        };
        assert!(matches!(
            request.validate(),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_accepts_complete_request() {
        let request = ContactRequest {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            message: "Hello".to_string(),
        };
        assert!(request.validate().is_ok());
    }
}
