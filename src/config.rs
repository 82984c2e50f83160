//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::domain::CurrencyTable;

const DEFAULT_CURRENCIES: &str = "USD:2,EUR:2,GBP:2,JPY:0";

/// Where ledger state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::InvalidValue("STORAGE_BACKEND")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,

    /// Database connection URL (required for the postgres backend)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// HMAC secret shared with signing clients
    pub signing_secret: String,

    /// Accepted clock skew and nonce lifetime
    pub signature_ttl_ms: i64,

    pub currencies: CurrencyTable,

    pub nonce_purge_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend: StorageBackend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let signing_secret = env::var("SIGNING_SECRET")
            .map_err(|_| ConfigError::MissingEnv("SIGNING_SECRET"))?;
        if signing_secret.is_empty() {
            return Err(ConfigError::InvalidValue("SIGNING_SECRET"));
        }

        let signature_ttl_ms: i64 = env::var("SIGNATURE_TTL_MS")
            .unwrap_or_else(|_| "300000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SIGNATURE_TTL_MS"))?;
        if signature_ttl_ms <= 0 {
            return Err(ConfigError::InvalidValue("SIGNATURE_TTL_MS"));
        }

        let currencies = CurrencyTable::parse(
            &env::var("CURRENCIES").unwrap_or_else(|_| DEFAULT_CURRENCIES.to_string()),
        )
        .ok_or(ConfigError::InvalidValue("CURRENCIES"))?;

        let nonce_purge_interval_secs: u64 = env::var("NONCE_PURGE_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("NONCE_PURGE_INTERVAL_SECS"))?;
        if nonce_purge_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("NONCE_PURGE_INTERVAL_SECS"));
        }

        Ok(Self {
            storage_backend,
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            signing_secret,
            signature_ttl_ms,
            currencies,
            nonce_purge_interval_secs,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
