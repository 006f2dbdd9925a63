//! Database configuration.
//!
//! Constructed by the host application (usually deserialized from its
//! own config file) and consumed by [`crate::ConnectionManager`]. No
//! file parsing happens here.

use std::time::Duration;

use serde::Deserialize;

use loam_core::dialect::Dialect;

/// Connection and policy settings for one database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Which engine the url points at.
    pub dialect: Dialect,
    /// Connection url (`postgres://...`, `mysql://...`, `sqlite:...`).
    pub url: String,
    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connections kept open when idle.
    #[serde(default)]
    pub min_connections: u32,
    /// How long an acquire may wait before failing with
    /// `CoreError::PoolTimeout`, in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Allow the synchronizer to emit data-discarding steps.
    #[serde(default)]
    pub allow_destructive_migrations: bool,
    /// Log every executed statement at debug level.
    #[serde(default)]
    pub log_statements: bool,
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_acquire_timeout_ms() -> u64 {
    30_000
}

impl DatabaseConfig {
    /// Creates a config with defaults for everything but the endpoint.
    #[must_use]
    pub fn new(dialect: Dialect, url: impl Into<String>) -> Self {
        Self {
            dialect,
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_ms: default_acquire_timeout_ms(),
            allow_destructive_migrations: false,
            log_statements: false,
        }
    }

    /// The acquire timeout as a [`Duration`].
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DatabaseConfig::new(Dialect::Sqlite, "sqlite::memory:");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 0);
        assert_eq!(config.acquire_timeout(), Duration::from_millis(30_000));
        assert!(!config.allow_destructive_migrations);
        assert!(!config.log_statements);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: DatabaseConfig = serde_json::from_str(
            r#"{"dialect": "postgres", "url": "postgres://localhost/app"}"#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn deserializes_overrides() {
        let config: DatabaseConfig = serde_json::from_str(
            r#"{
                "dialect": "mysql",
                "url": "mysql://localhost/app",
                "max_connections": 2,
                "acquire_timeout_ms": 50,
                "allow_destructive_migrations": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::MySql);
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.acquire_timeout_ms, 50);
        assert!(config.allow_destructive_migrations);
    }
}
