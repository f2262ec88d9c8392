//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::event_store::StoreOptions;

/// Default event table
pub const DEFAULT_TABLE_NAME: &str = "events";

/// Postgres identifier length limit
const MAX_TABLE_NAME_LEN: usize = 63;

/// Validated SQL table name.
///
/// The name is interpolated into statements, so only plain identifiers
/// (`[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes) are accepted. The name is
/// stored lowercased, the way Postgres folds unquoted identifiers, so catalog
/// lookups find the table that `CREATE TABLE` made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        let mut chars = name.chars();
        let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid_start && valid_rest && name.len() <= MAX_TABLE_NAME_LEN {
            Ok(Self(name.to_ascii_lowercase()))
        } else {
            Err(ConfigError::InvalidTableName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self(DEFAULT_TABLE_NAME.to_string())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// How long to wait for a pooled connection
    pub database_acquire_timeout: Duration,

    /// Table holding the event log
    pub table_name: TableName,

    /// Whether `save` may write the first events of an unknown entity
    pub allow_entity_creation: bool,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let acquire_timeout_secs: u64 = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_ACQUIRE_TIMEOUT_SECS"))?;

        let table_name = match env::var("EVENT_STORE_TABLE") {
            Ok(name) => TableName::parse(&name)?,
            Err(_) => TableName::default(),
        };

        let allow_entity_creation = match env::var("EVENT_STORE_ALLOW_ENTITY_CREATION") {
            Ok(value) => parse_bool(&value)
                .ok_or(ConfigError::InvalidValue("EVENT_STORE_ALLOW_ENTITY_CREATION"))?,
            Err(_) => true,
        };

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            database_acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            table_name,
            allow_entity_creation,
            environment,
        })
    }

    /// Store behaviour derived from this configuration
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            allow_entity_creation: self.allow_entity_creation,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),
}
