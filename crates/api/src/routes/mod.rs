//! API routes

pub mod accounts;
pub mod billing;
pub mod contact;
pub mod health;
pub mod plans;

use axum::{
    http::HeaderMap,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{auth::require_auth, state::AppState};

/// Extract client IP address from request headers.
/// Checks common proxy headers in order of preference.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("cf-connecting-ip") // Cloudflare
        .or_else(|| headers.get("x-real-ip"))
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|h| h.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public routes: webhooks authenticate via signatures, the contact form
    // is gated by the per-IP limiter
    let public_routes = Router::new()
        .route("/stripe/webhooks", post(billing::stripe_webhook))
        .route("/clerk/webhooks", post(accounts::clerk_webhook))
        .route("/contact", post(contact::submit_contact));

    // Protected routes (bearer token required)
    let protected_routes = Router::new()
        .route("/generate-plan", post(plans::generate_plan))
        .route("/plans", get(plans::list_plans))
        .route("/plans/:plan_id", delete(plans::delete_plan))
        .route("/subscription", get(billing::get_subscription))
        .route(
            "/stripe/create-checkout-session",
            post(billing::create_checkout_session),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .merge(health_routes)
        .nest("/api", public_routes.merge(protected_routes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
