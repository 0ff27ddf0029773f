//! Account-provider webhook routes

use axum::{extract::State, http::HeaderMap, Json};
use serde_json::json;

use crate::{error::ApiError, routes::extract_client_ip, state::AppState};

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!(header = name, "Account webhook missing header");
            ApiError::BadRequest(format!("Missing {} header", name))
        })
}

/// Clerk webhook receiver.
///
/// `user.created` provisions the free-tier subscription row; `user.deleted`
/// removes the user's stored data. Other event types are acknowledged
/// without action.
pub async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let svix_id = required_header(&headers, "svix-id")?;
    let svix_timestamp = required_header(&headers, "svix-timestamp")?;
    let svix_signature = required_header(&headers, "svix-signature")?;

    let event = state
        .clerk
        .verify(svix_id, svix_timestamp, svix_signature, &body)?;

    tracing::info!(
        event_type = %event.event_type,
        user_id = %event.data.id,
        client_ip = ?extract_client_ip(&headers),
        "Account webhook verified"
    );

    match event.event_type.as_str() {
        "user.created" => {
            state
                .billing
                .subscriptions
                .create_free_subscription(&event.data.id)
                .await?;
        }
        "user.deleted" => {
            // Remove the user's rows; billing-side cancellation arrives
            // separately through the Stripe webhook
            sqlx::query("DELETE FROM marketing_plans WHERE user_id = $1")
                .bind(&event.data.id)
                .execute(&state.pool)
                .await?;
            sqlx::query("DELETE FROM subscriptions WHERE user_id = $1")
                .bind(&event.data.id)
                .execute(&state.pool)
                .await?;
            tracing::info!(user_id = %event.data.id, "Removed data for deleted account");
        }
        other => {
            tracing::info!(event_type = %other, "Ignoring unhandled account event type");
        }
    }

    Ok(Json(json!({"received": true})))
}
