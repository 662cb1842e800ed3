//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required (with `STOREFRONT_STORE=postgres`, the default)
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `STOREFRONT_STORE` - `postgres` or `memory` (default: postgres)
//! - `STOREFRONT_SEED_FILE` - Catalog YAML loaded into the memory store at startup
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `RESERVATION_LOCK_TIMEOUT_MS` - Wait per product-lock attempt (default: 2000)
//! - `RESERVATION_LOCK_RETRIES` - Retries after the first attempt (default: 2)
//! - `RESERVATION_LOCK_BACKOFF_MS` - First retry backoff, doubled each retry (default: 50)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_TRACES_SAMPLE_RATE` - Fraction of requests traced (default: 0.1)
//! - `LOG_FORMAT` - `pretty` or `json` (default: pretty)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::inventory::LockPolicy;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which [`InventoryStore`](crate::db::InventoryStore) backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{other}'")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'pretty' or 'json', got '{other}'")),
        }
    }
}

/// Storefront application configuration.
///
/// `Debug` is safe to log: the database URL is a `SecretString`.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Storage backend
    pub store: StoreBackend,
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// Upper bound on pooled database connections
    pub max_connections: u32,
    /// Catalog loaded into the memory store at startup
    pub seed_file: Option<PathBuf>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Product lock wait and retry policy
    pub reservation: LockPolicy,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of requests sent to Sentry as transactions
    pub sentry_traces_sample_rate: f32,
    /// Log output format
    pub log_format: LogFormat,
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
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let store: StoreBackend = env.parse_or("STOREFRONT_STORE", StoreBackend::default())?;
        let database_url = env.database_url("STOREFRONT_DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "STOREFRONT_DATABASE_URL".to_string(),
            ));
        }

        let reservation = LockPolicy {
            timeout: Duration::from_millis(env.parse_or("RESERVATION_LOCK_TIMEOUT_MS", 2000)?),
            retries: env.parse_or("RESERVATION_LOCK_RETRIES", 2)?,
            backoff: Duration::from_millis(env.parse_or("RESERVATION_LOCK_BACKOFF_MS", 50)?),
        };
        if reservation.timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "RESERVATION_LOCK_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let max_connections: u32 = env.parse_or("DATABASE_MAX_CONNECTIONS", 10)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "DATABASE_MAX_CONNECTIONS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let sentry_traces_sample_rate: f32 = env.parse_or("SENTRY_TRACES_SAMPLE_RATE", 0.1)?;
        if !(0.0..=1.0).contains(&sentry_traces_sample_rate) {
            return Err(ConfigError::InvalidEnvVar(
                "SENTRY_TRACES_SAMPLE_RATE".to_string(),
                "must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(Self {
            store,
            database_url,
            max_connections,
            seed_file: env.optional("STOREFRONT_SEED_FILE").map(PathBuf::from),
            host: env.parse_or("STOREFRONT_HOST", IpAddr::from([127, 0, 0, 1]))?,
            port: env.parse_or("STOREFRONT_PORT", 3000)?,
            reservation,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_traces_sample_rate,
            log_format: env.parse_or("LOG_FORMAT", LogFormat::default())?,
        })
    }

    /// A memory-store configuration with defaults, for tests and local runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store: StoreBackend::Memory,
            database_url: None,
            max_connections: 10,
            seed_file: None,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            reservation: LockPolicy::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_traces_sample_rate: 0.0,
            log_format: LogFormat::default(),
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with the usual required/optional/default helpers.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional variable, treating blank values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    /// Get database URL with fallback to generic `DATABASE_URL`.
    fn database_url(&self, primary_key: &str) -> Option<SecretString> {
        self.optional(primary_key)
            .or_else(|| self.optional("DATABASE_URL"))
            .map(SecretString::from)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<StorefrontConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StorefrontConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("STOREFRONT_DATABASE_URL", "postgres://localhost/stockpile")]).unwrap();

        assert_eq!(config.store, StoreBackend::Postgres);
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.reservation, LockPolicy::default());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "STOREFRONT_DATABASE_URL"));
    }

    #[test]
    fn test_database_url_falls_back() {
        let config = load(&[("DATABASE_URL", "postgres://fallback/db")]).unwrap();
        assert_eq!(
            config.database_url.unwrap().expose_secret(),
            "postgres://fallback/db"
        );
    }

    #[test]
    fn test_memory_store_needs_no_database() {
        let config = load(&[("STOREFRONT_STORE", "memory"), ("LOG_FORMAT", "json")]).unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.database_url.is_none());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_lock_policy_from_env() {
        let config = load(&[
            ("STOREFRONT_STORE", "memory"),
            ("RESERVATION_LOCK_TIMEOUT_MS", "150"),
            ("RESERVATION_LOCK_RETRIES", "0"),
            ("RESERVATION_LOCK_BACKOFF_MS", "5"),
        ])
        .unwrap();

        assert_eq!(config.reservation.timeout, Duration::from_millis(150));
        assert_eq!(config.reservation.retries, 0);
        assert_eq!(config.reservation.backoff, Duration::from_millis(5));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = load(&[("STOREFRONT_STORE", "memory"), ("STOREFRONT_PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "STOREFRONT_PORT"));

        let err = load(&[("STOREFRONT_STORE", "redis")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "STOREFRONT_STORE"));

        let err = load(&[
            ("STOREFRONT_STORE", "memory"),
            ("RESERVATION_LOCK_TIMEOUT_MS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig::in_memory();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = load(&[(
            "STOREFRONT_DATABASE_URL",
            "postgres://stockpile:super_secret_password@db/stockpile",
        )])
        .unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("super_secret_password"));
    }
}
