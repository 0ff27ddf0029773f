//! Stripe webhook verification and processing
//!
//! Every delivery is verified against the signing secret, atomically claimed
//! in `stripe_webhook_events` for exclusive processing, reduced to a
//! [`BillingEventView`], and applied through the transition table with the
//! event's own timestamp guarding against out-of-order replays.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use stripe::{Event, EventObject, EventType, Expandable, Webhook};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::subscriptions::SubscriptionService;
use crate::transition::{is_good_standing, plan_transition, BillingEventView};

type HmacSha256 = Hmac<Sha256>;

/// Handles incoming Stripe webhooks
#[derive(Clone)]
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
    subscriptions: SubscriptionService,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let subscriptions = SubscriptionService::new(pool.clone());
        Self {
            stripe,
            pool,
            subscriptions,
        }
    }

    /// Verify and parse a Stripe webhook event
    ///
    /// Uses manual signature verification as a fallback to work around
    /// async-stripe version incompatibility with newer Stripe API versions.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;
        Self::verify_with_secret(payload, signature, webhook_secret)
    }

    fn verify_with_secret(
        payload: &str,
        signature: &str,
        webhook_secret: &str,
    ) -> BillingResult<Event> {
        // Try the standard method first
        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        // Parse the signature header: t=timestamp,v1=signature,v0=signature
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<String> = None;

        for part in signature.split(',') {
            let kv: Vec<&str> = part.splitn(2, '=').collect();
            if kv.len() == 2 {
                match kv[0] {
                    "t" => timestamp = kv[1].parse().ok(),
                    "v1" => v1_signature = Some(kv[1].to_string()),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::error!("Missing timestamp in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        let v1_signature = v1_signature.ok_or_else(|| {
            tracing::error!("Missing v1 signature in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        // Check timestamp tolerance (5 minutes)
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| {
                tracing::error!("System time error: {}", e);
                BillingError::WebhookSignatureInvalid
            })?
            .as_secs() as i64;

        if (now - timestamp).abs() > 300 {
            tracing::error!(
                timestamp = timestamp,
                now = now,
                diff = (now - timestamp).abs(),
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let secret_key = webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(webhook_secret);
        let signed_payload = format!("{}.{}", timestamp, payload);

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
            tracing::error!("Invalid webhook secret key");
            BillingError::WebhookSignatureInvalid
        })?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::error!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification passed"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event
    ///
    /// Uses INSERT...ON CONFLICT...RETURNING to atomically claim exclusive
    /// processing rights, so two concurrent deliveries of the same event ID
    /// cannot both run the handler. Redeliveries of events whose previous
    /// attempt failed, and events stuck in "processing" for over 30 minutes,
    /// can be re-claimed.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type_str = event.type_.to_string();

        let event_timestamp = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        let claimed =
            Self::claim_event(&self.pool, &event_id, &event_type_str, event_timestamp).await?;

        if claimed.is_none() {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type_str,
                "Duplicate webhook event, already claimed"
            );
            return Ok(());
        }

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Processing Stripe webhook event"
        );

        let result = self.process_event_internal(&event, event_timestamp).await;

        let (processing_result, error_message) = match &result {
            Ok(()) => ("success", None),
            Err(e) => ("error", Some(e.to_string())),
        };

        if let Err(e) = Self::record_outcome(
            &self.pool,
            &event_id,
            processing_result,
            error_message.as_deref(),
        )
        .await
        {
            tracing::error!(
                event_id = %event_id,
                processing_result = %processing_result,
                error = %e,
                "Failed to update webhook audit record, event may appear stuck in processing"
            );
        }

        result
    }

    /// Atomically claim an event ID for processing.
    ///
    /// The insert wins for a first delivery. The conditional update re-claims
    /// rows whose last attempt ended in error (the handler returned 500, so
    /// Stripe redelivers) and rows stuck in "processing" past the timeout.
    /// A row marked "success" is terminal and yields no claim.
    async fn claim_event(
        pool: &PgPool,
        event_id: &str,
        event_type: &str,
        event_timestamp: OffsetDateTime,
    ) -> BillingResult<Option<Uuid>> {
        const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events
                (stripe_event_id, event_type, event_timestamp, processing_result, processing_started_at)
            VALUES ($1, $2, $3, 'processing', NOW())
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW(),
                error_message = CONCAT('Re-claimed at ', NOW()::TEXT)
            WHERE stripe_webhook_events.processing_result = 'error'
               OR (stripe_webhook_events.processing_result = 'processing'
                   AND stripe_webhook_events.processing_started_at < NOW() - ($4 || ' minutes')::INTERVAL)
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(event_timestamp)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Failed to claim webhook event for processing"
            );
            BillingError::Database(e.to_string())
        })?;

        Ok(claimed.map(|(id,)| id))
    }

    async fn record_outcome(
        pool: &PgPool,
        event_id: &str,
        processing_result: &str,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET processing_result = $1, error_message = $2
            WHERE stripe_event_id = $3
            "#,
        )
        .bind(processing_result)
        .bind(error_message)
        .bind(event_id)
        .execute(pool)
        .await
        .map(|_| ())
    }

    async fn process_event_internal(
        &self,
        event: &Event,
        event_timestamp: OffsetDateTime,
    ) -> BillingResult<()> {
        let view = match event.type_ {
            EventType::CheckoutSessionCompleted => {
                Some(self.view_from_checkout(event.clone()).await?)
            }
            EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated => {
                Some(self.view_from_subscription(event.clone()).await?)
            }
            EventType::CustomerSubscriptionDeleted => {
                Some(self.view_from_deletion(event.clone()).await?)
            }
            _ => {
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "Received unhandled Stripe event type"
                );
                None
            }
        };

        let Some(view) = view else {
            return Ok(());
        };

        let change = plan_transition(&view, &self.stripe.config().price_ids)?;
        self.subscriptions
            .apply_change(&change, event_timestamp)
            .await?;

        Ok(())
    }

    /// Build the event view for a completed checkout session.
    ///
    /// The session payload does not carry the price directly, so the
    /// referenced subscription is retrieved from Stripe to learn it.
    async fn view_from_checkout(&self, event: Event) -> BillingResult<BillingEventView> {
        let session = match event.data.object {
            EventObject::CheckoutSession(session) => session,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "Expected CheckoutSession".to_string(),
                ))
            }
        };

        let user_id = session
            .metadata
            .as_ref()
            .and_then(|m| m.get("user_id"))
            .cloned()
            .or_else(|| session.client_reference_id.clone())
            .ok_or_else(|| {
                BillingError::Internal("Checkout session missing user_id metadata".to_string())
            })?;

        let subscription_id = match &session.subscription {
            Some(sub) => sub.id().to_string(),
            None => {
                return Err(BillingError::Internal(
                    "Checkout session has no subscription".to_string(),
                ))
            }
        };

        let subscription = stripe::Subscription::retrieve(
            self.stripe.inner(),
            &subscription_id.parse().map_err(|_| {
                BillingError::Internal(format!("Invalid subscription ID: {}", subscription_id))
            })?,
            &[],
        )
        .await?;

        let price_id = Self::price_id_of(&subscription).ok_or_else(|| {
            BillingError::Internal(format!(
                "Subscription {} has no price item",
                subscription_id
            ))
        })?;

        Ok(BillingEventView::CheckoutCompleted {
            user_id,
            subscription_id,
            customer_id: Some(customer_id_of(&subscription.customer)),
            price_id,
        })
    }

    async fn view_from_subscription(&self, event: Event) -> BillingResult<BillingEventView> {
        let subscription = extract_subscription(event)?;
        let subscription_id = subscription.id.to_string();
        let user_id = self
            .resolve_user_id(&subscription.metadata, &subscription_id)
            .await?;

        let price_id = Self::price_id_of(&subscription).ok_or_else(|| {
            BillingError::Internal(format!(
                "Subscription {} has no price item",
                subscription_id
            ))
        })?;

        Ok(BillingEventView::SubscriptionUpdated {
            user_id,
            subscription_id,
            customer_id: Some(customer_id_of(&subscription.customer)),
            price_id,
            in_good_standing: is_good_standing(subscription.status),
        })
    }

    async fn view_from_deletion(&self, event: Event) -> BillingResult<BillingEventView> {
        let subscription = extract_subscription(event)?;
        let subscription_id = subscription.id.to_string();
        let user_id = self
            .resolve_user_id(&subscription.metadata, &subscription_id)
            .await?;

        Ok(BillingEventView::SubscriptionDeleted { user_id })
    }

    /// Resolve the owning user from subscription metadata, falling back to
    /// the record store when the payload carries none.
    async fn resolve_user_id(
        &self,
        metadata: &std::collections::HashMap<String, String>,
        subscription_id: &str,
    ) -> BillingResult<String> {
        if let Some(user_id) = metadata.get("user_id") {
            return Ok(user_id.clone());
        }

        self.subscriptions
            .find_user_by_subscription(subscription_id)
            .await?
            .ok_or_else(|| {
                BillingError::SubscriptionNotFound(format!(
                    "No user found for subscription {}",
                    subscription_id
                ))
            })
    }

    fn price_id_of(subscription: &stripe::Subscription) -> Option<String> {
        subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.to_string())
    }
}

fn extract_subscription(event: Event) -> BillingResult<stripe::Subscription> {
    match event.data.object {
        EventObject::Subscription(subscription) => Ok(subscription),
        _ => Err(BillingError::WebhookEventNotSupported(
            "Expected Subscription".to_string(),
        )),
    }
}

fn customer_id_of(customer: &Expandable<stripe::Customer>) -> String {
    customer.id().to_string()
}
