//! Core domain types for Growth Academy
//!
//! Plan tiers, subscription records, and generation-usage accounting shared
//! between the API server and the billing crate.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Subscription plan tier
///
/// Determines the monthly AI-generation quota and feature access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Expert,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Expert => "expert",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(PlanTier::Free),
            "pro" => Some(PlanTier::Pro),
            "expert" => Some(PlanTier::Expert),
            _ => None,
        }
    }

    /// Monthly marketing-plan generation quota for this tier.
    ///
    /// The expert quota comes from EXPERT_MONTHLY_PLAN_LIMIT.
    pub fn monthly_plan_limit(&self, expert_limit: u32) -> u32 {
        match self {
            PlanTier::Free => 1,
            PlanTier::Pro => 10,
            PlanTier::Expert => expert_limit,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing standing of a subscription record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "inactive" => Some(SubscriptionStatus::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's subscription record (one row per user)
///
/// `plan_type != free` implies both Stripe identifiers are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub plan_type: PlanTier,
    pub status: SubscriptionStatus,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl SubscriptionRecord {
    /// Synthesized default for users without a stored row.
    ///
    /// Absence of a row must never fail a feature gate; the safe fallback is
    /// always the free tier in good standing.
    pub fn free_default(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            plan_type: PlanTier::Free,
            status: SubscriptionStatus::Active,
            stripe_subscription_id: None,
            stripe_customer_id: None,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for SubscriptionRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let plan_raw: String = row.try_get("plan_type")?;
        let plan_type = PlanTier::parse(&plan_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "plan_type".to_string(),
            source: format!("unknown plan tier: {}", plan_raw).into(),
        })?;

        let status_raw: String = row.try_get("status")?;
        let status =
            SubscriptionStatus::parse(&status_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: format!("unknown subscription status: {}", status_raw).into(),
            })?;

        Ok(Self {
            user_id: row.try_get("user_id")?,
            plan_type,
            status,
            stripe_subscription_id: row.try_get("stripe_subscription_id")?,
            stripe_customer_id: row.try_get("stripe_customer_id")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Monthly generation usage for a user, derived at query time
#[derive(Debug, Clone, Serialize)]
pub struct GenerationUsage {
    pub plans_used: i64,
    pub plan_limit: u32,
}

impl GenerationUsage {
    pub fn remaining(&self) -> i64 {
        (self.plan_limit as i64 - self.plans_used).max(0)
    }

    pub fn exhausted(&self) -> bool {
        self.plans_used >= self.plan_limit as i64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn test_plan_tier_roundtrip() {
        for tier in [PlanTier::Free, PlanTier::Pro, PlanTier::Expert] {
            assert_eq!(PlanTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(PlanTier::parse("platinum"), None);
    }

    #[test]
    fn test_plan_tier_quota() {
        assert_eq!(PlanTier::Free.monthly_plan_limit(20), 1);
        assert_eq!(PlanTier::Pro.monthly_plan_limit(20), 10);
        assert_eq!(PlanTier::Expert.monthly_plan_limit(20), 20);
        assert_eq!(PlanTier::Expert.monthly_plan_limit(30), 30);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            SubscriptionStatus::parse("active"),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(
            SubscriptionStatus::parse("inactive"),
            Some(SubscriptionStatus::Inactive)
        );
        assert_eq!(SubscriptionStatus::parse("past_due"), None);
    }

    #[test]
    fn test_free_default_is_active() {
        let record = SubscriptionRecord::free_default("user_123");
        assert_eq!(record.plan_type, PlanTier::Free);
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert!(record.stripe_subscription_id.is_none());
        assert!(record.stripe_customer_id.is_none());
    }

    #[test]
    fn test_usage_remaining() {
        let usage = GenerationUsage {
            plans_used: 7,
            plan_limit: 10,
        };
        assert_eq!(usage.remaining(), 3);
        assert!(!usage.exhausted());

        let maxed = GenerationUsage {
            plans_used: 10,
            plan_limit: 10,
        };
        assert_eq!(maxed.remaining(), 0);
        assert!(maxed.exhausted());
    }
}
