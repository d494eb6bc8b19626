//! Environment-driven server settings.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const STORE_ENV: &str = "STORE";
pub const ENTITIES_PATH_ENV: &str = "ENTITIES_PATH";
pub const BIND_ADDR_ENV: &str = "BIND_ADDR";
pub const DB_MAX_CONNECTIONS_ENV: &str = "DB_MAX_CONNECTIONS";
pub const BODY_LIMIT_ENV: &str = "BODY_LIMIT_BYTES";

/// Which persistence adapter backs the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(ConfigError::Validation(format!(
                "{} must be 'postgres' or 'memory', got '{}'",
                STORE_ENV, other
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub store: StoreKind,
    /// `None` uses the built-in entity descriptors.
    pub entities_path: Option<PathBuf>,
    pub bind_addr: String,
    pub max_connections: u32,
    pub body_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/crud_gateway".into(),
            store: StoreKind::Postgres,
            entities_path: None,
            bind_addr: "0.0.0.0:3000".into(),
            max_connections: 5,
            body_limit: 1024 * 1024,
        }
    }
}

impl Settings {
    /// Read settings from the process environment (after `dotenvy` has run).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; unset or empty variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();
        if let Some(url) = get(DATABASE_URL_ENV) {
            settings.database_url = url;
        }
        if let Some(store) = get(STORE_ENV) {
            settings.store = store.parse()?;
        }
        settings.entities_path = get(ENTITIES_PATH_ENV).map(PathBuf::from);
        if let Some(addr) = get(BIND_ADDR_ENV) {
            settings.bind_addr = addr;
        }
        if let Some(n) = get(DB_MAX_CONNECTIONS_ENV) {
            settings.max_connections = parse_number(DB_MAX_CONNECTIONS_ENV, &n)?;
        }
        if let Some(n) = get(BODY_LIMIT_ENV) {
            settings.body_limit = parse_number(BODY_LIMIT_ENV, &n)?;
        }
        Ok(settings)
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} must be a positive integer, got '{}'", name, raw)))
}
