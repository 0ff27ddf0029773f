//! Checkout session creation

use growth_shared::PlanTier;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionSubscriptionData,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Creates Stripe Checkout sessions for plan upgrades
#[derive(Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a subscription checkout session for an authenticated user.
    ///
    /// The user identity comes from the verified session, never from the
    /// request body. The user ID rides in the session metadata so the
    /// completion webhook can attribute the purchase.
    pub async fn create_subscription_checkout(
        &self,
        user_id: &str,
        email: Option<&str>,
        plan: PlanTier,
    ) -> BillingResult<CheckoutSession> {
        let config = self.stripe.config();
        let price_id = config
            .price_id_for_plan(plan)
            .ok_or_else(|| BillingError::InvalidPlan(plan.to_string()))?;

        let success_url = format!("{}/dashboard?success=true", config.app_base_url);
        let cancel_url = format!("{}/pricing?canceled=true", config.app_base_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("plan".to_string(), plan.as_str().to_string());

        let line_items = vec![CreateCheckoutSessionLineItems {
            price: Some(price_id.to_string()),
            quantity: Some(1),
            ..Default::default()
        }];

        let params = CreateCheckoutSession {
            customer_email: email,
            client_reference_id: Some(user_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(line_items),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata.clone()),
            // Copy the metadata onto the subscription so later webhook
            // events resolve the user without a database lookup
            subscription_data: Some(CreateCheckoutSessionSubscriptionData {
                metadata: Some(metadata),
                ..Default::default()
            }),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            user_id = %user_id,
            plan = %plan,
            session_id = %session.id,
            "Created checkout session"
        );

        Ok(session)
    }
}
