//! Stripe client configuration

use growth_shared::PlanTier;
use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price IDs for each paid subscription tier
    pub price_ids: PriceIds,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
}

/// Stripe price IDs for the paid subscription tiers.
/// Tier hierarchy: Free (no price) → Pro → Expert.
#[derive(Debug, Clone)]
pub struct PriceIds {
    pub pro: String,
    pub expert: String,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            price_ids: PriceIds {
                pro: std::env::var("STRIPE_PRICE_PRO")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_PRO not set".to_string()))?,
                expert: std::env::var("STRIPE_PRICE_EXPERT")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_EXPERT not set".to_string()))?,
            },
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        })
    }

    /// Get price ID for a paid tier (free has no price)
    pub fn price_id_for_plan(&self, plan: PlanTier) -> Option<&str> {
        match plan {
            PlanTier::Free => None,
            PlanTier::Pro => Some(&self.price_ids.pro),
            PlanTier::Expert => Some(&self.price_ids.expert),
        }
    }
}

impl PriceIds {
    /// Map a price ID back to its plan tier.
    ///
    /// An unrecognized price is an error at the call site: silently defaulting
    /// would corrupt billing state, so callers must abort the event instead.
    pub fn plan_for_price_id(&self, price_id: &str) -> Option<PlanTier> {
        if price_id == self.pro {
            Some(PlanTier::Pro)
        } else if price_id == self.expert {
            Some(PlanTier::Expert)
        } else {
            None
        }
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    fn prices() -> PriceIds {
        PriceIds {
            pro: "price_pro_123".to_string(),
            expert: "price_expert_456".to_string(),
        }
    }

    #[test]
    fn test_plan_for_price_id() {
        let prices = prices();
        assert_eq!(
            prices.plan_for_price_id("price_pro_123"),
            Some(PlanTier::Pro)
        );
        assert_eq!(
            prices.plan_for_price_id("price_expert_456"),
            Some(PlanTier::Expert)
        );
        assert_eq!(prices.plan_for_price_id("price_unknown"), None);
    }

    #[test]
    fn test_price_id_for_plan() {
        let config = StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_ids: prices(),
            app_base_url: "http://localhost:5173".to_string(),
        };
        assert_eq!(config.price_id_for_plan(PlanTier::Free), None);
        assert_eq!(
            config.price_id_for_plan(PlanTier::Pro),
            Some("price_pro_123")
        );
        assert_eq!(
            config.price_id_for_plan(PlanTier::Expert),
            Some("price_expert_456")
        );
    }
}
