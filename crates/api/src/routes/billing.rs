//! Billing routes for Stripe integration

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use growth_shared::{GenerationUsage, PlanTier};

use crate::{auth::AuthUser, error::ApiError, state::AppState};

use super::plans;

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub plan: String,
}

/// Response from creating a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// Subscription info response
#[derive(Debug, Serialize)]
pub struct SubscriptionInfo {
    pub plan_type: String,
    pub status: String,
    pub plans_used: i64,
    pub plan_limit: u32,
    pub plans_remaining: i64,
}

/// Stripe webhook receiver.
///
/// Takes the raw body so signature verification runs over the exact bytes
/// Stripe signed, before any JSON parsing.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let event = state
        .billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = ?e, "Stripe webhook signature verification failed");
            ApiError::BadRequest("Invalid webhook signature".to_string())
        })?;

    tracing::info!(
        event_type = %event.type_,
        event_id = %event.id,
        "Stripe webhook event verified"
    );

    // Processing failures return 500 so Stripe retries the delivery
    state.billing.webhooks.handle_event(event).await.map_err(|e| {
        tracing::error!("Webhook handling error: {}", e);
        ApiError::Database(format!("Webhook handling error: {}", e))
    })?;

    Ok(Json(json!({"received": true})))
}

/// Create a checkout session for a plan upgrade.
///
/// The target plan comes from the request body; the identity attached to
/// the session comes from the verified bearer token.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let plan = PlanTier::parse(&req.plan)
        .ok_or_else(|| ApiError::Validation(format!("Unknown plan: {}", req.plan)))?;

    if plan == PlanTier::Free {
        return Err(ApiError::Validation(
            "The free plan does not require checkout".to_string(),
        ));
    }

    let session = state
        .billing
        .checkout
        .create_subscription_checkout(&auth_user.user_id, auth_user.email.as_deref(), plan)
        .await?;

    Ok(Json(CheckoutResponse {
        session_id: session.id.to_string(),
        url: session.url,
    }))
}

/// Current subscription record plus monthly usage
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<SubscriptionInfo>, ApiError> {
    let record = state
        .billing
        .subscriptions
        .get_subscription(&auth_user.user_id)
        .await?;

    let usage = GenerationUsage {
        plans_used: state
            .billing
            .subscriptions
            .monthly_generation_count(&auth_user.user_id)
            .await?,
        plan_limit: plans::effective_tier(&record)
            .monthly_plan_limit(state.config.expert_monthly_plan_limit),
    };

    Ok(Json(SubscriptionInfo {
        plan_type: record.plan_type.to_string(),
        status: record.status.to_string(),
        plans_used: usage.plans_used,
        plan_limit: usage.plan_limit,
        plans_remaining: usage.remaining(),
    }))
}
