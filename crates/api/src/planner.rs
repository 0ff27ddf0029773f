//! Marketing plan generation proxy
//!
//! Forwards validated plan requests to the Anthropic Messages API with a
//! bounded retry policy. Only transport errors and retryable upstream
//! statuses (429, 5xx) are retried; client errors surface immediately.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::error::ApiError;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_INTERVAL_MS: u64 = 1000;
const MAX_OUTPUT_TOKENS: u32 = 1000;

/// A plan generation request from the client
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    #[serde(default)]
    pub business_idea: String,
    #[serde(default)]
    pub target_market: String,
    #[serde(default)]
    pub current_stage: String,
    #[serde(default)]
    pub marketing_goals: String,
    #[serde(default)]
    pub budget: String,
}

impl PlanRequest {
    /// All five fields are required and must be non-empty
    pub fn validate(&self) -> Result<(), ApiError> {
        let missing: Vec<&str> = [
            ("businessIdea", &self.business_idea),
            ("targetMarket", &self.target_market),
            ("currentStage", &self.current_stage),
            ("marketingGoals", &self.marketing_goals),
            ("budget", &self.budget),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum UpstreamError {
    #[error("transient upstream error: {0}")]
    Transient(String),
    #[error("upstream request rejected: {0}")]
    Permanent(String),
}

impl UpstreamError {
    fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Transient(_))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

/// Client for the Anthropic Messages API
#[derive(Clone)]
pub struct PlanGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl PlanGenerator {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.llm_request_timeout_ms))
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build HTTP client");
                ApiError::Internal
            })?;

        Ok(Self {
            http,
            api_key: config.anthropic_api_key.clone(),
            model: config.anthropic_model.clone(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Generate a marketing plan, retrying transient upstream failures.
    ///
    /// Makes at most three attempts with a fixed one-second interval. A 4xx
    /// response other than 429 is returned after the first attempt.
    pub async fn generate(&self, request: &PlanRequest) -> Result<String, ApiError> {
        request.validate()?;

        let prompt = build_prompt(request);
        let attempts = AtomicU32::new(0);

        use tokio_retry::strategy::FixedInterval;
        use tokio_retry::Retry;

        let retry_strategy =
            FixedInterval::from_millis(RETRY_INTERVAL_MS).take((MAX_ATTEMPTS - 1) as usize);

        let result = Retry::spawn(retry_strategy, || async {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let result = self.call_messages_api(&prompt).await;

            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        attempt = attempt,
                        error = %e,
                        "Plan generation attempt failed, will retry"
                    );
                    Err(result)
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt,
                        error = %e,
                        "Plan generation rejected upstream, not retrying"
                    );
                    Ok(result)
                }
            }
        })
        .await
        .unwrap_or_else(|e| e);

        result.map_err(|e| match e {
            UpstreamError::Transient(msg) => ApiError::Upstream(format!(
                "Plan generation failed after {} attempts: {}",
                attempts.load(Ordering::SeqCst),
                msg
            )),
            UpstreamError::Permanent(msg) => ApiError::Upstream(msg),
        })
    }

    async fn call_messages_api(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::Transient(format!("HTTP {}", status)));
        }
        if status.is_client_error() {
            return Err(UpstreamError::Permanent(format!("HTTP {}", status)));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Transient(format!("Invalid response body: {}", e)))?;

        parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| UpstreamError::Transient("Empty response content".to_string()))
    }
}

/// Build the generation prompt. The numbered section structure is part of
/// the product contract; the client renders each section by heading.
pub fn build_prompt(request: &PlanRequest) -> String {
    format!(
        "You are an expert marketing strategist. Create a comprehensive marketing plan \
         for the following business.\n\n\
         Business Idea: {}\n\
         Target Market: {}\n\
         Current Stage: {}\n\
         Marketing Goals: {}\n\
         Budget: {}\n\n\
         Structure the plan with exactly these numbered sections:\n\
         1. Executive Summary\n\
         2. Mission Statement\n\
         3. Marketing Objectives\n\
         4. SWOT Analysis\n\
         5. Market Research\n\
         6. Marketing Strategy\n\
         7. Budget Allocation\n\n\
         Be specific and actionable within the stated budget.",
        request.business_idea,
        request.target_market,
        request.current_stage,
        request.marketing_goals,
        request.budget
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> Config {
        Config {
            bind_address: "0.0.0.0:3000".to_string(),
            public_url: "http://localhost:3000".to_string(),
            database_url: "postgres://test".to_string(),
            database_max_connections: 5,
            jwt_secret: "test-jwt-secret-must-be-at-least-32-characters".to_string(),
            clerk_webhook_secret: "whsec_dGVzdA==".to_string(),
            anthropic_api_key: "sk-ant-test".to_string(),
            anthropic_model: "claude-3-opus-20240229".to_string(),
            anthropic_base_url: base_url.to_string(),
            llm_request_timeout_ms: 5000,
            expert_monthly_plan_limit: 20,
            contact_max_per_hour: 3,
        }
    }

    fn valid_request() -> PlanRequest {
        PlanRequest {
            business_idea: "Artisanal coffee subscription".to_string(),
            target_market: "Remote workers".to_string(),
            current_stage: "Pre-launch".to_string(),
            marketing_goals: "First 100 subscribers".to_string(),
            budget: "$500/month".to_string(),
        }
    }

    #[test]
    fn test_validation_rejects_empty_fields() {
        let mut request = valid_request();
        request.target_market = "  ".to_string();
        request.budget = String::new();

        let err = request.validate().unwrap_err();
        match err {
            ApiError::Validation(msg) => {
                assert!(msg.contains("targetMarket"));
                assert!(msg.contains("budget"));
                assert!(!msg.contains("businessIdea"));
            }
            other => panic!("Expected validation error, got: {:?}", other),
        }
    }

    #[test]
    fn test_prompt_contains_all_fields_and_sections() {
        let prompt = build_prompt(&valid_request());
        assert!(prompt.contains("Artisanal coffee subscription"));
        assert!(prompt.contains("Remote workers"));
        assert!(prompt.contains("Pre-launch"));
        assert!(prompt.contains("First 100 subscribers"));
        assert!(prompt.contains("$500/month"));
        for section in [
            "1. Executive Summary",
            "2. Mission Statement",
            "3. Marketing Objectives",
            "4. SWOT Analysis",
            "5. Market Research",
            "6. Marketing Strategy",
            "7. Budget Allocation",
        ] {
            assert!(prompt.contains(section), "missing section: {}", section);
        }
    }

    #[tokio::test]
    async fn test_generate_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_body(r#"{"content":[{"type":"text","text":"1. Executive Summary..."}]}"#)
            .create_async()
            .await;

        let generator = PlanGenerator::new(&test_config(&server.url())).unwrap();
        let text = generator.generate(&valid_request()).await.unwrap();

        assert_eq!(text, "1. Executive Summary...");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_exhausts_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(503)
            .with_body("down")
            .expect(3)
            .create_async()
            .await;

        let generator = PlanGenerator::new(&test_config(&server.url())).unwrap();
        let err = generator.generate(&valid_request()).await.unwrap_err();

        match err {
            ApiError::Upstream(msg) => assert!(msg.contains("3 attempts"), "got: {}", msg),
            other => panic!("Expected upstream error, got: {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_client_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(400)
            .with_body(r#"{"error":{"type":"invalid_request_error"}}"#)
            .expect(1)
            .create_async()
            .await;

        let generator = PlanGenerator::new(&test_config(&server.url())).unwrap();
        let err = generator.generate(&valid_request()).await.unwrap_err();

        assert!(matches!(err, ApiError::Upstream(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_rate_limit_is_retried() {
        // All three attempts hit the 429, proving rate limits are treated
        // as transient rather than surfaced like other client errors
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(429)
            .with_body("slow down")
            .expect(3)
            .create_async()
            .await;

        let generator = PlanGenerator::new(&test_config(&server.url())).unwrap();
        let err = generator.generate(&valid_request()).await.unwrap_err();

        assert!(matches!(err, ApiError::Upstream(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_request_makes_no_upstream_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .expect(0)
            .create_async()
            .await;

        let generator = PlanGenerator::new(&test_config(&server.url())).unwrap();
        let err = generator
            .generate(&PlanRequest {
                business_idea: String::new(),
                target_market: String::new(),
                current_stage: String::new(),
                marketing_goals: String::new(),
                budget: String::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Validation(_)));
        mock.assert_async().await;
    }
}
