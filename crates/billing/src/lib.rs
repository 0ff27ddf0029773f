//! Growth Academy Billing
//!
//! Stripe integration for tiered subscriptions: checkout session creation,
//! webhook verification and reconciliation, and the subscription record store.

pub mod checkout;
pub mod client;
pub mod error;
pub mod subscriptions;
pub mod transition;
pub mod webhooks;

pub use checkout::CheckoutService;
pub use client::{PriceIds, StripeClient, StripeConfig};
pub use error::{BillingError, BillingResult};
pub use subscriptions::SubscriptionService;
pub use webhooks::WebhookHandler;
