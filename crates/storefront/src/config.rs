//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string for session storage
//!   (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `WISHLIST_API_ENDPOINT` - Base URL of the wishlist backend (e.g., <https://wishlist.example.com>)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `WISHLIST_API_TOKEN` - Bearer token sent to the wishlist backend
//! - `WISHLIST_REQUEST_TIMEOUT_SECS` - Backend request timeout (default: 10)
//! - `WISHLIST_LOCK_TIMEOUT_SECS` - Age after which a pending lock is abandoned (default: 30)
//! - `WISHLIST_MERGE_POLICY` - `retain-failed` or `clear-all` (default: retain-failed)
//! - `WISHLIST_PRODUCT_GID_PREFIX` - Product GID prefix (default: `gid://shopify/Product/`)
//! - `WISHLIST_EMPTY_MESSAGE` - Text shown on an empty wishlist page
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate, 0.0 to 1.0 (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate, 0.0 to 1.0 (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;
use wishlist_core::SHOPIFY_PRODUCT_GID_PREFIX;

use crate::wishlist::MergePolicy;

const DEFAULT_EMPTY_MESSAGE: &str = "Your wishlist is empty.";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Wishlist backend and engine configuration
    pub wishlist: WishlistConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry transaction sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Wishlist backend and engine configuration.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct WishlistConfig {
    /// Wishlist backend base URL
    pub api_endpoint: Url,
    /// Bearer token for the wishlist backend
    pub api_token: Option<SecretString>,
    /// Per-request timeout for backend calls
    pub request_timeout: Duration,
    /// Age after which a pending operation lock may be taken over
    pub lock_timeout: Duration,
    /// What to do with local entries that failed to migrate on login
    pub merge_policy: MergePolicy,
    /// Prefix stripped from product GIDs
    pub product_gid_prefix: String,
    /// Fallback text for an empty wishlist page
    pub empty_message: String,
}

impl std::fmt::Debug for WishlistConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WishlistConfig")
            .field("api_endpoint", &self.api_endpoint.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("lock_timeout", &self.lock_timeout)
            .field("merge_policy", &self.merge_policy)
            .field("product_gid_prefix", &self.product_gid_prefix)
            .field("empty_message", &self.empty_message)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string())
        })?;

        let wishlist = WishlistConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            wishlist,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_sample_rate("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_sample_rate("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl WishlistConfig {
    /// Load the wishlist section from environment variables.
    ///
    /// Shared with the CLI, which talks to the same backend.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `WISHLIST_API_ENDPOINT` is missing or any
    /// value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = get_required_env("WISHLIST_API_ENDPOINT")?;
        let api_endpoint = Url::parse(&endpoint).map_err(|e| {
            ConfigError::InvalidEnvVar("WISHLIST_API_ENDPOINT".to_string(), e.to_string())
        })?;

        let merge_policy = get_env_or_default("WISHLIST_MERGE_POLICY", "retain-failed")
            .parse::<MergePolicy>()
            .map_err(|e| ConfigError::InvalidEnvVar("WISHLIST_MERGE_POLICY".to_string(), e))?;

        Ok(Self {
            api_endpoint,
            api_token: get_optional_env("WISHLIST_API_TOKEN")
                .filter(|token| !token.is_empty())
                .map(SecretString::from),
            request_timeout: Duration::from_secs(parse_env(
                "WISHLIST_REQUEST_TIMEOUT_SECS",
                "10",
            )?),
            lock_timeout: Duration::from_secs(parse_env("WISHLIST_LOCK_TIMEOUT_SECS", "30")?),
            merge_policy,
            product_gid_prefix: get_env_or_default(
                "WISHLIST_PRODUCT_GID_PREFIX",
                SHOPIFY_PRODUCT_GID_PREFIX,
            ),
            empty_message: get_env_or_default("WISHLIST_EMPTY_MESSAGE", DEFAULT_EMPTY_MESSAGE),
        })
    }

    /// Configuration pointing at `api_endpoint` with every other value defaulted.
    #[must_use]
    pub fn with_endpoint(api_endpoint: Url) -> Self {
        Self {
            api_endpoint,
            api_token: None,
            request_timeout: Duration::from_secs(10),
            lock_timeout: Duration::from_secs(30),
            merge_policy: MergePolicy::default(),
            product_gid_prefix: SHOPIFY_PRODUCT_GID_PREFIX.to_string(),
            empty_message: DEFAULT_EMPTY_MESSAGE.to_string(),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a Sentry sample rate, which must lie in `0.0..=1.0`.
fn parse_sample_rate(key: &str, default: &str) -> Result<f32, ConfigError> {
    validate_sample_rate(key, parse_env(key, default)?)
}

fn validate_sample_rate(key: &str, rate: f32) -> Result<f32, ConfigError> {
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be between 0.0 and 1.0 (got {rate})"),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn wishlist_config() -> WishlistConfig {
        WishlistConfig {
            api_token: Some(SecretString::from("super_secret_wishlist_token")),
            ..WishlistConfig::with_endpoint(Url::parse("https://wishlist.example.com").unwrap())
        }
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            wishlist: wishlist_config(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_wishlist_config_debug_redacts_token() {
        let debug_output = format!("{:?}", wishlist_config());

        assert!(debug_output.contains("wishlist.example.com"));
        assert!(debug_output.contains("RetainFailed"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_wishlist_token"));
    }

    #[test]
    fn test_with_endpoint_defaults() {
        let config = WishlistConfig::with_endpoint(Url::parse("http://127.0.0.1:9000").unwrap());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.lock_timeout, Duration::from_secs(30));
        assert_eq!(config.merge_policy, MergePolicy::RetainFailed);
        assert_eq!(config.product_gid_prefix, "gid://shopify/Product/");
        assert_eq!(config.empty_message, "Your wishlist is empty.");
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u16>("PORT", " 8080 ").unwrap(), 8080);
        assert!(matches!(
            parse_value::<u16>("PORT", "eighty"),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "PORT"
        ));
        assert!(parse_value::<IpAddr>("HOST", "0.0.0.0").is_ok());
    }

    #[test]
    fn test_validate_sample_rate() {
        assert!(validate_sample_rate("RATE", 0.0).is_ok());
        assert!(validate_sample_rate("RATE", 1.0).is_ok());
        assert!(validate_sample_rate("RATE", 1.5).is_err());
        assert!(validate_sample_rate("RATE", -0.1).is_err());
    }
}
