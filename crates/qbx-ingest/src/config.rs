//! Ingestion configuration
//!
//! Credentials, remote API endpoints, pagination behavior, and the
//! destination database, all loaded from environment variables.

use qbx_common::types::Environment;
use qbx_common::QbxError;
use std::time::Duration;

use crate::error::{IngestError, Result};
use crate::extractor::FailurePolicy;
use crate::loader::LoadStrategy;
use crate::retry::{RateLimitPolicy, DEFAULT_RATE_LIMIT_DELAY_SECS, DEFAULT_RATE_LIMIT_MAX_ATTEMPTS};

// ============================================================================
// Configuration Constants
// ============================================================================

/// OAuth2 token endpoint for refresh-token exchange.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

/// Records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Pause between successful pages, in milliseconds.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 500;

/// Client-side timeout for each HTTP request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/warehouse";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

fn required_env(name: &str) -> std::result::Result<String, QbxError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| QbxError::MissingEnv(name.to_string()))
}

fn parsed_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// Credentials
// ============================================================================

/// OAuth client credentials and the tenant (realm) they act on
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub realm_id: String,
    pub refresh_token: String,
}

impl Credentials {
    /// Load from `QB_CLIENT_ID`, `QB_CLIENT_SECRET`, `QB_REALM_ID`, `QB_REFRESH_TOKEN`
    pub fn from_env() -> std::result::Result<Self, QbxError> {
        Ok(Self {
            client_id: required_env("QB_CLIENT_ID")?,
            client_secret: required_env("QB_CLIENT_SECRET")?,
            realm_id: required_env("QB_REALM_ID")?,
            refresh_token: required_env("QB_REFRESH_TOKEN")?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("realm_id", &self.realm_id)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Remote API
// ============================================================================

/// Where and how to reach the remote API
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub environment: Environment,
    /// Company-scoped base URL, e.g. `https://quickbooks.api.intuit.com/v3/company/123`
    pub base_url: String,
    pub token_url: String,
    pub request_timeout: Duration,
}

impl ApiConfig {
    /// Standard endpoints for `environment` and `realm_id`
    pub fn for_realm(environment: Environment, realm_id: &str) -> Self {
        Self {
            environment,
            base_url: format!("{}/v3/company/{}", environment.api_host(), realm_id),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Load from `QB_ENVIRONMENT`, with `QB_API_BASE_URL`, `QB_TOKEN_URL` and
    /// `QB_REQUEST_TIMEOUT_SECS` as overrides
    pub fn from_env(realm_id: &str) -> Self {
        let environment = Environment::from_label(&std::env::var("QB_ENVIRONMENT").unwrap_or_default());
        let mut config = Self::for_realm(environment, realm_id);

        if let Ok(base_url) = std::env::var("QB_API_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(token_url) = std::env::var("QB_TOKEN_URL") {
            config.token_url = token_url;
        }
        config.request_timeout = Duration::from_secs(parsed_env(
            "QB_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ));

        config
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Pagination, pacing and failure behavior of the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub page_size: u32,
    /// Pause after each full page
    pub page_delay: Duration,
    pub rate_limit: RateLimitPolicy,
    pub failure_policy: FailurePolicy,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            rate_limit: RateLimitPolicy::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl ExtractorConfig {
    /// Load from environment variables
    ///
    /// - `QB_PAGE_SIZE` (default 100)
    /// - `QB_PAGE_DELAY_MS` (default 500)
    /// - `QB_RATE_LIMIT_DELAY_SECS` (default 60)
    /// - `QB_RATE_LIMIT_MAX_ATTEMPTS` (default 8; `0` retries forever at a fixed interval)
    /// - `QB_FAILURE_POLICY` (`partial` or `propagate`)
    pub fn from_env() -> Result<Self> {
        let delay = Duration::from_secs(parsed_env(
            "QB_RATE_LIMIT_DELAY_SECS",
            DEFAULT_RATE_LIMIT_DELAY_SECS,
        ));
        let max_attempts = parsed_env("QB_RATE_LIMIT_MAX_ATTEMPTS", DEFAULT_RATE_LIMIT_MAX_ATTEMPTS);

        let rate_limit = if max_attempts == 0 {
            RateLimitPolicy::fixed(delay)
        } else {
            RateLimitPolicy {
                base_delay: delay,
                ..RateLimitPolicy::default()
            }
            .with_max_attempts(Some(max_attempts))
        };

        let failure_policy = match std::env::var("QB_FAILURE_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => FailurePolicy::default(),
        };

        let config = Self {
            page_size: parsed_env("QB_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            page_delay: Duration::from_millis(parsed_env("QB_PAGE_DELAY_MS", DEFAULT_PAGE_DELAY_MS)),
            rate_limit,
            failure_policy,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(IngestError::config("QB_PAGE_SIZE must be greater than 0"));
        }
        if self.rate_limit.max_attempts == Some(0) {
            return Err(IngestError::config(
                "Rate limit max_attempts must be greater than 0 when bounded",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Database
// ============================================================================

/// Destination database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl DatabaseConfig {
    /// Load from `.env` (if present) and the environment; needs no API credentials
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load from `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`, `DATABASE_CONNECT_TIMEOUT`
    pub fn from_env() -> Result<Self> {
        let config = Self {
            url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_connections: parsed_env("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
            connect_timeout_secs: parsed_env(
                "DATABASE_CONNECT_TIMEOUT",
                DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(IngestError::config("Database URL cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(IngestError::config("Database max_connections must be greater than 0"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ============================================================================
// Top-level
// ============================================================================

/// Everything one `qbx-ingest` invocation needs
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub credentials: Credentials,
    pub api: ApiConfig,
    pub extractor: ExtractorConfig,
    pub database: DatabaseConfig,
    pub load_strategy: LoadStrategy,
}

impl IngestConfig {
    /// Load configuration from `.env` (if present) and the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let credentials = Credentials::from_env()?;
        let api = ApiConfig::from_env(&credentials.realm_id);

        let load_strategy = match std::env::var("QB_LOAD_STRATEGY") {
            Ok(value) => value.parse()?,
            Err(_) => LoadStrategy::default(),
        };

        Ok(Self {
            credentials,
            api,
            extractor: ExtractorConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            load_strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_for_realm() {
        let sandbox = ApiConfig::for_realm(Environment::Sandbox, "4620816365");
        assert_eq!(
            sandbox.base_url,
            "https://sandbox-quickbooks.api.intuit.com/v3/company/4620816365"
        );
        assert_eq!(sandbox.token_url, DEFAULT_TOKEN_URL);

        let production = ApiConfig::for_realm(Environment::Production, "99");
        assert_eq!(production.base_url, "https://quickbooks.api.intuit.com/v3/company/99");
        assert_eq!(production.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let credentials = Credentials {
            client_id: "client".into(),
            client_secret: "s3cret".into(),
            realm_id: "123".into(),
            refresh_token: "refresh-abc".into(),
        };

        let debug = format!("{credentials:?}");
        assert!(debug.contains("client"));
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("refresh-abc"));
    }

    #[test]
    fn test_extractor_defaults() {
        let config = ExtractorConfig::default();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.page_delay, Duration::from_millis(500));
        assert_eq!(config.failure_policy, FailurePolicy::ReturnPartial);
        assert_eq!(config.rate_limit.base_delay, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extractor_validation() {
        let config = ExtractorConfig {
            page_size: 0,
            ..ExtractorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ExtractorConfig {
            rate_limit: RateLimitPolicy::default().with_max_attempts(Some(0)),
            ..ExtractorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_config_needs_no_api_credentials() {
        for name in ["QB_CLIENT_ID", "QB_CLIENT_SECRET", "QB_REALM_ID", "QB_REFRESH_TOKEN"] {
            std::env::remove_var(name);
        }

        assert!(matches!(
            Credentials::from_env(),
            Err(QbxError::MissingEnv(name)) if name == "QB_CLIENT_ID"
        ));

        let database = DatabaseConfig::load().unwrap();
        assert!(!database.url.is_empty());
    }

    #[test]
    fn test_database_validation() {
        assert!(DatabaseConfig::default().validate().is_ok());

        let config = DatabaseConfig {
            max_connections: 0,
            ..DatabaseConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
