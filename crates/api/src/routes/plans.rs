//! Marketing plan generation and history routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::json;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use growth_shared::{GenerationUsage, PlanTier, SubscriptionRecord, SubscriptionStatus};

use crate::{auth::AuthUser, error::ApiError, planner::PlanRequest, state::AppState};

/// A stored generated plan
#[derive(Debug, Serialize, FromRow)]
pub struct StoredPlan {
    pub id: Uuid,
    pub business_idea: String,
    pub target_market: String,
    pub current_stage: String,
    pub marketing_goals: String,
    pub budget: String,
    pub generated_plan: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The tier whose quota applies. A record whose billing standing has lapsed
/// is quota-limited as free regardless of the plan it still names.
pub fn effective_tier(record: &SubscriptionRecord) -> PlanTier {
    match record.status {
        SubscriptionStatus::Active => record.plan_type,
        SubscriptionStatus::Inactive => PlanTier::Free,
    }
}

/// Days until the monthly quota resets
fn days_until_next_month(today: Date) -> i64 {
    let (next_year, next_month) = match today.month().next() {
        time::Month::January => (today.year() + 1, time::Month::January),
        month => (today.year(), month),
    };
    // The first of a month always exists
    match Date::from_calendar_date(next_year, next_month, 1) {
        Ok(first) => (first - today).whole_days(),
        Err(_) => 0,
    }
}

/// Generate a marketing plan.
///
/// The quota gate runs before any upstream I/O. Persistence of the result
/// is best-effort: a storage failure is logged but never fails the response.
pub async fn generate_plan(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    request.validate()?;

    let record = state
        .billing
        .subscriptions
        .get_subscription(&auth_user.user_id)
        .await?;
    let tier = effective_tier(&record);

    let usage = GenerationUsage {
        plans_used: state
            .billing
            .subscriptions
            .monthly_generation_count(&auth_user.user_id)
            .await?,
        plan_limit: tier.monthly_plan_limit(state.config.expert_monthly_plan_limit),
    };

    if usage.exhausted() {
        let days = days_until_next_month(OffsetDateTime::now_utc().date());
        tracing::info!(
            user_id = %auth_user.user_id,
            tier = %tier,
            used = usage.plans_used,
            limit = usage.plan_limit,
            "Monthly plan quota exhausted"
        );
        return Err(ApiError::QuotaExceeded(format!(
            "Monthly limit of {} plans reached for the {} tier. Try again in {} days.",
            usage.plan_limit, tier, days
        )));
    }

    let text = state.planner.generate(&request).await?;

    // Best-effort persistence; the quota counter only advances on success
    let insert = sqlx::query(
        r#"
        INSERT INTO marketing_plans
            (user_id, business_idea, target_market, current_stage,
             marketing_goals, budget, generated_plan)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&auth_user.user_id)
    .bind(&request.business_idea)
    .bind(&request.target_market)
    .bind(&request.current_stage)
    .bind(&request.marketing_goals)
    .bind(&request.budget)
    .bind(&text)
    .execute(&state.pool)
    .await;

    if let Err(e) = insert {
        tracing::error!(
            user_id = %auth_user.user_id,
            error = %e,
            "Failed to persist generated plan"
        );
    }

    Ok(Json(json!({"content": [{"text": text}]})))
}

/// List the caller's generated plans, newest first
pub async fn list_plans(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<Vec<StoredPlan>>, ApiError> {
    let plans = sqlx::query_as::<_, StoredPlan>(
        r#"
        SELECT id, business_idea, target_market, current_stage,
               marketing_goals, budget, generated_plan, created_at
        FROM marketing_plans
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(&auth_user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(plans))
}

/// Delete one of the caller's plans
pub async fn delete_plan(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM marketing_plans WHERE id = $1 AND user_id = $2")
        .bind(plan_id)
        .bind(&auth_user.user_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use time::macros::date;

    fn record(plan: PlanTier, status: SubscriptionStatus) -> SubscriptionRecord {
        SubscriptionRecord {
            user_id: "user_1".to_string(),
            plan_type: plan,
            status,
            stripe_subscription_id: None,
            stripe_customer_id: None,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_effective_tier_active_keeps_plan() {
        let r = record(PlanTier::Expert, SubscriptionStatus::Active);
        assert_eq!(effective_tier(&r), PlanTier::Expert);
    }

    #[test]
    fn test_effective_tier_lapsed_falls_back_to_free() {
        let r = record(PlanTier::Pro, SubscriptionStatus::Inactive);
        assert_eq!(effective_tier(&r), PlanTier::Free);
    }

    #[test]
    fn test_days_until_next_month_mid_month() {
        assert_eq!(days_until_next_month(date!(2024 - 03 - 15)), 17);
    }

    #[test]
    fn test_days_until_next_month_year_boundary() {
        assert_eq!(days_until_next_month(date!(2024 - 12 - 31)), 1);
    }

    #[test]
    fn test_days_until_next_month_first_day() {
        assert_eq!(days_until_next_month(date!(2024 - 02 - 01)), 29);
    }
}
