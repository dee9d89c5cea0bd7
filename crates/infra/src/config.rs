//! Configuration loading and representation.
//!
//! All settings come from the process environment (optionally seeded from a
//! `.env` file by the binary). `AppConfig::from_lookup` takes the lookup as a
//! closure so tests never touch the real environment.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8082;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid DATABASE_URL: {0}")]
    InvalidDatabaseUrl(String),
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub use_persistent_stores: bool,
    pub request_timeout: Duration,
    pub database: DatabaseConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            use_persistent_stores: parse_flag(&lookup, "USE_PERSISTENT_STORES", true)?,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            database: DatabaseConfig::from_lookup(&lookup)?,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

/// Connection parameters for the relational datastore.
#[derive(Clone)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            host: lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(lookup, "DB_PORT", 5432)?,
            user: lookup("DB_USER").unwrap_or_else(|| "postgres".to_string()),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            name: lookup("DB_NAME").unwrap_or_else(|| "products".to_string()),
            max_connections: parse_or(lookup, "DB_MAX_CONNECTIONS", 10)?,
            acquire_timeout: Duration::from_secs(parse_or(lookup, "DB_ACQUIRE_TIMEOUT_SECS", 5)?),
        })
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        match &self.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string())),
            None => Ok(PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.name)),
        }
    }
}

// Hand-written so the password never reaches the logs.
impl core::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value: v.clone(),
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.use_persistent_stores);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.database.host, "localhost");
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.database.name, "products");
        assert!(cfg.database.url.is_none());
        assert_eq!(cfg.bind_addr().port(), DEFAULT_PORT);
    }

    #[test]
    fn reads_database_parts_and_port() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_USER", "catalog"),
            ("DB_PASSWORD", "hunter2"),
            ("DB_NAME", "catalog"),
            ("USE_PERSISTENT_STORES", "false"),
        ]))
        .unwrap();

        assert_eq!(cfg.port, 9000);
        assert!(!cfg.use_persistent_stores);
        assert_eq!(cfg.database.host, "db.internal");
        assert_eq!(cfg.database.port, 6543);
        assert_eq!(cfg.database.user, "catalog");
        assert!(cfg.database.connect_options().is_ok());
    }

    #[test]
    fn invalid_numbers_are_reported_with_their_key() {
        let err = AppConfig::from_lookup(lookup(&[("DB_PORT", "not-a-port")])).unwrap_err();
        match err {
            ConfigError::Invalid { key, .. } => assert_eq!(key, "DB_PORT"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = AppConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "USE_PERSISTENT_STORES", .. }));
    }

    #[test]
    fn database_url_takes_precedence() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://u:p@remote:5433/shop"),
            ("DB_HOST", "ignored"),
        ]))
        .unwrap();
        assert!(cfg.database.url.is_some());
        assert!(cfg.database.connect_options().is_ok());

        let bad = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "not a url")])).unwrap();
        assert!(matches!(
            bad.database.connect_options(),
            Err(ConfigError::InvalidDatabaseUrl(_))
        ));
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let cfg = AppConfig::from_lookup(lookup(&[("DB_PASSWORD", "hunter2")])).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
