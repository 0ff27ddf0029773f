//! Webhook event → subscription record transitions
//!
//! The single canonical reconciliation path: every billing event that can
//! mutate a subscription record goes through [`plan_transition`], a pure
//! mapping from an extracted event view to the record mutation to apply.
//! The webhook handler is responsible only for verification, extraction,
//! and persistence; the mapping itself has no network or database
//! dependency and is unit-tested in isolation.

use growth_shared::{PlanTier, SubscriptionStatus};

use crate::client::PriceIds;
use crate::error::{BillingError, BillingResult};

/// The billing-relevant fields of a verified webhook event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEventView {
    /// A checkout session completed; the referenced billing subscription has
    /// already been looked up to learn its price.
    CheckoutCompleted {
        user_id: String,
        subscription_id: String,
        customer_id: Option<String>,
        price_id: String,
    },
    /// The billing subscription object changed (plan switch, payment state).
    SubscriptionUpdated {
        user_id: String,
        subscription_id: String,
        customer_id: Option<String>,
        price_id: String,
        /// Whether the payload's status maps to good standing
        in_good_standing: bool,
    },
    /// The billing subscription was canceled/deleted.
    SubscriptionDeleted { user_id: String },
}

/// The record mutation produced by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub user_id: String,
    pub plan_type: PlanTier,
    pub status: SubscriptionStatus,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
}

/// Map a Stripe subscription status onto the two-valued record standing.
/// Trialing subscriptions are treated as in good standing.
pub fn is_good_standing(status: stripe::SubscriptionStatus) -> bool {
    matches!(
        status,
        stripe::SubscriptionStatus::Active | stripe::SubscriptionStatus::Trialing
    )
}

/// Compute the subscription record mutation for a billing event.
///
/// An unknown price ID aborts the event with [`BillingError::UnknownPrice`]
/// rather than defaulting to a guessed tier.
pub fn plan_transition(
    view: &BillingEventView,
    prices: &PriceIds,
) -> BillingResult<SubscriptionChange> {
    match view {
        BillingEventView::CheckoutCompleted {
            user_id,
            subscription_id,
            customer_id,
            price_id,
        } => {
            let plan_type = prices
                .plan_for_price_id(price_id)
                .ok_or_else(|| BillingError::UnknownPrice(price_id.clone()))?;
            Ok(SubscriptionChange {
                user_id: user_id.clone(),
                plan_type,
                status: SubscriptionStatus::Active,
                stripe_subscription_id: Some(subscription_id.clone()),
                stripe_customer_id: customer_id.clone(),
            })
        }
        BillingEventView::SubscriptionUpdated {
            user_id,
            subscription_id,
            customer_id,
            price_id,
            in_good_standing,
        } => {
            let plan_type = prices
                .plan_for_price_id(price_id)
                .ok_or_else(|| BillingError::UnknownPrice(price_id.clone()))?;
            let status = if *in_good_standing {
                SubscriptionStatus::Active
            } else {
                SubscriptionStatus::Inactive
            };
            Ok(SubscriptionChange {
                user_id: user_id.clone(),
                plan_type,
                status,
                stripe_subscription_id: Some(subscription_id.clone()),
                stripe_customer_id: customer_id.clone(),
            })
        }
        BillingEventView::SubscriptionDeleted { user_id } => Ok(SubscriptionChange {
            user_id: user_id.clone(),
            plan_type: PlanTier::Free,
            status: SubscriptionStatus::Inactive,
            stripe_subscription_id: None,
            stripe_customer_id: None,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    fn prices() -> PriceIds {
        PriceIds {
            pro: "price_pro".to_string(),
            expert: "price_expert".to_string(),
        }
    }

    #[test]
    fn test_checkout_completed_maps_price_to_plan() {
        let view = BillingEventView::CheckoutCompleted {
            user_id: "user_1".to_string(),
            subscription_id: "sub_1".to_string(),
            customer_id: Some("cus_1".to_string()),
            price_id: "price_pro".to_string(),
        };

        let change = plan_transition(&view, &prices()).unwrap();
        assert_eq!(change.plan_type, PlanTier::Pro);
        assert_eq!(change.status, SubscriptionStatus::Active);
        assert_eq!(change.stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(change.stripe_customer_id.as_deref(), Some("cus_1"));
    }

    #[test]
    fn test_checkout_completed_expert_price() {
        let view = BillingEventView::CheckoutCompleted {
            user_id: "user_1".to_string(),
            subscription_id: "sub_1".to_string(),
            customer_id: None,
            price_id: "price_expert".to_string(),
        };

        let change = plan_transition(&view, &prices()).unwrap();
        assert_eq!(change.plan_type, PlanTier::Expert);
        assert_eq!(change.status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_unknown_price_aborts_event() {
        let view = BillingEventView::CheckoutCompleted {
            user_id: "user_1".to_string(),
            subscription_id: "sub_1".to_string(),
            customer_id: None,
            price_id: "price_legacy".to_string(),
        };

        let err = plan_transition(&view, &prices()).unwrap_err();
        assert!(matches!(err, BillingError::UnknownPrice(ref p) if p == "price_legacy"));
    }

    #[test]
    fn test_updated_carries_payload_standing() {
        let good = BillingEventView::SubscriptionUpdated {
            user_id: "user_1".to_string(),
            subscription_id: "sub_1".to_string(),
            customer_id: Some("cus_1".to_string()),
            price_id: "price_expert".to_string(),
            in_good_standing: true,
        };
        let change = plan_transition(&good, &prices()).unwrap();
        assert_eq!(change.plan_type, PlanTier::Expert);
        assert_eq!(change.status, SubscriptionStatus::Active);

        let lapsed = BillingEventView::SubscriptionUpdated {
            user_id: "user_1".to_string(),
            subscription_id: "sub_1".to_string(),
            customer_id: Some("cus_1".to_string()),
            price_id: "price_expert".to_string(),
            in_good_standing: false,
        };
        let change = plan_transition(&lapsed, &prices()).unwrap();
        assert_eq!(change.plan_type, PlanTier::Expert);
        assert_eq!(change.status, SubscriptionStatus::Inactive);
    }

    #[test]
    fn test_deleted_resets_to_free() {
        let view = BillingEventView::SubscriptionDeleted {
            user_id: "user_1".to_string(),
        };

        let change = plan_transition(&view, &prices()).unwrap();
        assert_eq!(
            change,
            SubscriptionChange {
                user_id: "user_1".to_string(),
                plan_type: PlanTier::Free,
                status: SubscriptionStatus::Inactive,
                stripe_subscription_id: None,
                stripe_customer_id: None,
            }
        );
    }

    #[test]
    fn test_deleted_is_idempotent() {
        let view = BillingEventView::SubscriptionDeleted {
            user_id: "user_1".to_string(),
        };
        let first = plan_transition(&view, &prices()).unwrap();
        let second = plan_transition(&view, &prices()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_good_standing_mapping() {
        assert!(is_good_standing(stripe::SubscriptionStatus::Active));
        assert!(is_good_standing(stripe::SubscriptionStatus::Trialing));
        assert!(!is_good_standing(stripe::SubscriptionStatus::PastDue));
        assert!(!is_good_standing(stripe::SubscriptionStatus::Canceled));
        assert!(!is_good_standing(stripe::SubscriptionStatus::Unpaid));
        assert!(!is_good_standing(stripe::SubscriptionStatus::Incomplete));
    }
}
