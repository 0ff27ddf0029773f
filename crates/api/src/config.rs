//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub clerk_webhook_secret: String,

    // Anthropic
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    pub anthropic_base_url: String,
    pub llm_request_timeout_ms: u64,

    // Quotas
    pub expert_monthly_plan_limit: u32,
    pub contact_max_per_hour: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Authentication
            jwt_secret: {
                let secret = env::var("AUTH_JWT_SECRET")
                    .map_err(|_| ConfigError::Missing("AUTH_JWT_SECRET"))?;
                // Signing key must be cryptographically strong
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "AUTH_JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            clerk_webhook_secret: env::var("CLERK_WEBHOOK_SECRET")
                .map_err(|_| ConfigError::Missing("CLERK_WEBHOOK_SECRET"))?,

            // Anthropic
            anthropic_api_key: env::var("ANTHROPIC_API_KEY")
                .map_err(|_| ConfigError::Missing("ANTHROPIC_API_KEY"))?,
            anthropic_model: env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-3-opus-20240229".to_string()),
            anthropic_base_url: env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            llm_request_timeout_ms: env::var("LLM_REQUEST_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30000),

            // Quotas
            expert_monthly_plan_limit: env::var("EXPERT_MONTHLY_PLAN_LIMIT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            contact_max_per_hour: env::var("CONTACT_MAX_PER_HOUR")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "AUTH_JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
        env::set_var("CLERK_WEBHOOK_SECRET", "whsec_dGVzdA==");
        env::set_var("ANTHROPIC_API_KEY", "sk-ant-test");
    }

    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("AUTH_JWT_SECRET");
        env::remove_var("CLERK_WEBHOOK_SECRET");
        env::remove_var("ANTHROPIC_API_KEY");
        env::remove_var("EXPERT_MONTHLY_PLAN_LIMIT");
    }

    #[test]
    #[serial]
    fn test_missing_database_url_fails() {
        cleanup_config();
        setup_minimal_config();
        env::remove_var("DATABASE_URL");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_short_jwt_secret_rejected() {
        cleanup_config();
        setup_minimal_config();
        env::set_var("AUTH_JWT_SECRET", "too-short");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::WeakSecret(_))));
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        cleanup_config();
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.anthropic_model, "claude-3-opus-20240229");
        assert_eq!(config.llm_request_timeout_ms, 30000);
        assert_eq!(config.expert_monthly_plan_limit, 20);
        assert_eq!(config.contact_max_per_hour, 3);
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_expert_limit_override() {
        cleanup_config();
        setup_minimal_config();
        env::set_var("EXPERT_MONTHLY_PLAN_LIMIT", "30");

        let config = Config::from_env().unwrap();
        assert_eq!(config.expert_monthly_plan_limit, 30);
        cleanup_config();
    }
}
