//! Subscription record store
//!
//! One row per user keyed by `user_id`. Webhook-driven writes carry the
//! event's creation timestamp and are applied conditionally so that a
//! delayed retry of an older event can never clobber a newer state.

use growth_shared::SubscriptionRecord;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::BillingResult;
use crate::transition::SubscriptionChange;

/// Subscription persistence operations
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a user's subscription record, defaulting to the free tier when
    /// no row exists yet.
    pub async fn get_subscription(&self, user_id: &str) -> BillingResult<SubscriptionRecord> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT user_id, plan_type, status, stripe_subscription_id,
                   stripe_customer_id, updated_at
            FROM subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.unwrap_or_else(|| SubscriptionRecord::free_default(user_id)))
    }

    /// Insert the free-tier row for a newly provisioned account.
    /// A row that already exists is left untouched.
    pub async fn create_free_subscription(&self, user_id: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, plan_type, status, updated_at)
            VALUES ($1, 'free', 'active', NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, "Provisioned free subscription");
        Ok(())
    }

    /// Apply a webhook-derived subscription change.
    ///
    /// `event_created` is the originating event's timestamp. The update only
    /// lands when the stored row is not newer, so replayed or out-of-order
    /// deliveries degrade to no-ops. Returns whether the write was applied.
    pub async fn apply_change(
        &self,
        change: &SubscriptionChange,
        event_created: OffsetDateTime,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions
                (user_id, plan_type, status, stripe_subscription_id,
                 stripe_customer_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                plan_type = EXCLUDED.plan_type,
                status = EXCLUDED.status,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                updated_at = EXCLUDED.updated_at
            WHERE subscriptions.updated_at <= EXCLUDED.updated_at
            "#,
        )
        .bind(&change.user_id)
        .bind(change.plan_type.as_str())
        .bind(change.status.as_str())
        .bind(&change.stripe_subscription_id)
        .bind(&change.stripe_customer_id)
        .bind(event_created)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if applied {
            tracing::info!(
                user_id = %change.user_id,
                plan = %change.plan_type,
                status = %change.status,
                "Subscription updated"
            );
        } else {
            tracing::info!(
                user_id = %change.user_id,
                "Skipped stale subscription update"
            );
        }
        Ok(applied)
    }

    /// Count the plans a user has generated since the start of the current
    /// calendar month. The quota counter is derived from persisted rows, so
    /// it survives restarts and is shared across instances.
    pub async fn monthly_generation_count(&self, user_id: &str) -> BillingResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM marketing_plans
            WHERE user_id = $1 AND created_at >= date_trunc('month', NOW())
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Look up the owning user by Stripe subscription ID. Used when a webhook
    /// payload arrives without user metadata.
    pub async fn find_user_by_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> BillingResult<Option<String>> {
        let user_id = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM subscriptions WHERE stripe_subscription_id = $1",
        )
        .bind(stripe_subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }
}
