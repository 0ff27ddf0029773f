//! Account-provider (Clerk) webhook verification
//!
//! Clerk delivers webhooks through Svix. The signature covers
//! `"{svix-id}.{svix-timestamp}.{body}"` with an HMAC-SHA256 key carried
//! base64-encoded in the `whsec_` secret, and the header may list several
//! space-separated `v1,<sig>` candidates after key rotation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// An account-provider webhook event
#[derive(Debug, Deserialize)]
pub struct ClerkEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: ClerkEventData,
}

#[derive(Debug, Deserialize)]
pub struct ClerkEventData {
    pub id: String,
}

/// Verifies Svix-signed webhook deliveries
#[derive(Clone)]
pub struct ClerkWebhookVerifier {
    key: Vec<u8>,
}

impl ClerkWebhookVerifier {
    pub fn new(secret: &str) -> Result<Self, ApiError> {
        let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
        let key = BASE64.decode(encoded).map_err(|_| {
            tracing::error!("Account webhook secret is not valid base64");
            ApiError::Internal
        })?;
        Ok(Self { key })
    }

    /// Verify a delivery and parse the event payload
    pub fn verify(
        &self,
        svix_id: &str,
        svix_timestamp: &str,
        svix_signature: &str,
        body: &str,
    ) -> Result<ClerkEvent, ApiError> {
        let timestamp: i64 = svix_timestamp.parse().map_err(|_| {
            tracing::warn!("Account webhook timestamp is not numeric");
            ApiError::BadRequest("Invalid webhook signature".to_string())
        })?;

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                timestamp = timestamp,
                now = now,
                "Account webhook timestamp outside tolerance"
            );
            return Err(ApiError::BadRequest("Invalid webhook signature".to_string()));
        }

        let signed_content = format!("{}.{}.{}", svix_id, svix_timestamp, body);
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| ApiError::Internal)?;
        mac.update(signed_content.as_bytes());
        let expected = BASE64.encode(mac.finalize().into_bytes());

        // Header format: "v1,<sig> v1,<sig> ..." across key rotations
        let matched = svix_signature
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .any(|(version, sig)| version == "v1" && sig == expected);

        if !matched {
            tracing::warn!("Account webhook signature mismatch");
            return Err(ApiError::BadRequest("Invalid webhook signature".to_string()));
        }

        serde_json::from_str(body).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse account webhook payload");
            ApiError::BadRequest("Invalid webhook payload".to_string())
        })
    }
}
