//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use growth_billing::{
    CheckoutService, StripeClient, SubscriptionService, WebhookHandler,
};
use growth_shared::RateLimitService;

use crate::auth::AuthState;
use crate::clerk::ClerkWebhookVerifier;
use crate::config::Config;
use crate::error::ApiError;
use crate::planner::PlanGenerator;

/// Billing services bundled together
#[derive(Clone)]
pub struct BillingState {
    pub checkout: CheckoutService,
    pub webhooks: WebhookHandler,
    pub subscriptions: SubscriptionService,
}

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub auth: AuthState,
    pub billing: BillingState,
    pub clerk: ClerkWebhookVerifier,
    pub planner: PlanGenerator,
    pub contact_limiter: Arc<RateLimitService>,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool, stripe: StripeClient) -> Result<Self, ApiError> {
        let auth = AuthState::new(&config.jwt_secret);
        let clerk = ClerkWebhookVerifier::new(&config.clerk_webhook_secret)?;
        let planner = PlanGenerator::new(&config)?;

        let billing = BillingState {
            checkout: CheckoutService::new(stripe.clone()),
            webhooks: WebhookHandler::new(stripe.clone(), pool.clone()),
            subscriptions: SubscriptionService::new(pool.clone()),
        };

        Ok(Self {
            config: Arc::new(config),
            pool,
            auth,
            billing,
            clerk,
            planner,
            contact_limiter: Arc::new(RateLimitService::new()),
        })
    }

    /// State handed to the auth middleware layer
    pub fn auth_state(&self) -> AuthState {
        self.auth.clone()
    }
}
