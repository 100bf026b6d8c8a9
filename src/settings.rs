//! Runtime settings read from the environment (after `.env` is loaded).

use crate::error::ConfigError;
use std::net::SocketAddr;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Which `EntityStore` backend the server runs on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Memory,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub store: StoreBackend,
    /// Postgres schema holding the catalog tables.
    pub schema: String,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());
        let store = match lookup("CATALOG_STORE").map(|s| s.trim().to_lowercase()) {
            Some(kind) if kind == "memory" => StoreBackend::Memory,
            Some(kind) if kind == "postgres" => StoreBackend::Postgres {
                database_url: database_url.ok_or(ConfigError::InvalidSetting {
                    key: "DATABASE_URL",
                    value: String::new(),
                })?,
            },
            Some(other) => {
                return Err(ConfigError::InvalidSetting {
                    key: "CATALOG_STORE",
                    value: other,
                })
            }
            None => match database_url {
                Some(database_url) => StoreBackend::Postgres { database_url },
                None => StoreBackend::Memory,
            },
        };

        let schema = lookup("CATALOG_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.into());
        if schema.is_empty() || !schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::InvalidSetting {
                key: "CATALOG_SCHEMA",
                value: schema,
            });
        }

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                key: "DATABASE_MAX_CONNECTIONS",
                value: v.clone(),
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let bind = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        let bind_addr = bind.parse().map_err(|_| ConfigError::InvalidSetting {
            key: "BIND_ADDR",
            value: bind.clone(),
        })?;

        Ok(Settings {
            store,
            schema,
            max_connections,
            bind_addr,
        })
    }
}
