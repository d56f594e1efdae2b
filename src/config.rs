//! Application configuration.
//!
//! All settings come from environment variables (with CLI flag equivalents,
//! parsed in `main`). The result is one immutable [`AppConfig`] constructed
//! at startup and passed to every component by reference.

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreKind;

/// Default polling interval between iterations.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default delay before re-probing after a failed iteration.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Minimum allowed polling interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Datastore connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub host: String,
    pub port: u16,
    pub db_name: String,
    pub user: String,
    pub password: String,
    /// Source tag carried on every envelope (e.g. "mongo-a", "postgres-b").
    pub source: String,
    /// Topology hint: a replica-set name means multi-node replicated,
    /// `None` means standalone.
    pub replica_set: Option<String>,
}

impl StoreConfig {
    /// Build a store config, filling unset fields with the per-variant
    /// deployment defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: StoreKind,
        host: String,
        port: Option<u16>,
        db_name: Option<String>,
        user: Option<String>,
        password: Option<String>,
        source: Option<String>,
        replica_set: Option<String>,
    ) -> Self {
        let (default_port, default_db, default_user, default_password, default_source) = match kind
        {
            StoreKind::Mongodb => (27017, "dbA", "userA", "passwordA", "mongo-a"),
            StoreKind::Postgresql => (5432, "db_a", "user_a", "user_a_pass", "postgres-a"),
        };
        Self {
            kind,
            host,
            port: port.unwrap_or(default_port),
            db_name: db_name.unwrap_or_else(|| default_db.to_string()),
            user: user.unwrap_or_else(|| default_user.to_string()),
            password: password.unwrap_or_else(|| default_password.to_string()),
            source: source.unwrap_or_else(|| default_source.to_string()),
            replica_set,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Datastore connection settings.
    pub store: StoreConfig,
    /// Downstream ingestion endpoint URL.
    pub endpoint: String,
    /// Cluster tag carried on every envelope.
    pub cluster: String,
    /// Polling interval between iterations.
    pub interval: Duration,
    /// Delay before re-probing after a failed iteration.
    pub retry_delay: Duration,
}

impl AppConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "datastore host must not be empty".to_string(),
            ));
        }
        if self.store.port == 0 {
            return Err(ConfigError::ValidationError(
                "datastore port must be non-zero".to_string(),
            ));
        }
        self.endpoint.parse::<reqwest::Url>().map_err(|_| {
            ConfigError::ValidationError(format!("invalid endpoint URL: '{}'", self.endpoint))
        })?;
        if self.retry_delay.is_zero() {
            return Err(ConfigError::ValidationError(
                "retry delay must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Clamp the polling interval to the minimum, warning if it was lower.
    pub fn clamp_interval(mut self) -> Self {
        if self.interval < MIN_INTERVAL {
            tracing::warn!(min_interval = ?MIN_INTERVAL,
                "Polling interval is less than minimum allowed. Using minimum."
            );
            self.interval = MIN_INTERVAL;
        }
        self
    }

    /// Default cluster tag for a datastore family, matching the deployments
    /// the daemon ships alongside.
    pub fn default_cluster(kind: StoreKind) -> &'static str {
        match kind {
            StoreKind::Mongodb => "cluster2",
            StoreKind::Postgresql => "cluster1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(kind: StoreKind) -> AppConfig {
        AppConfig {
            store: StoreConfig::new(
                kind,
                "localhost".to_string(),
                None,
                None,
                None,
                None,
                None,
                None,
            ),
            endpoint: "http://127.0.0.1:8080".to_string(),
            cluster: AppConfig::default_cluster(kind).to_string(),
            interval: DEFAULT_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[test]
    fn test_mongo_defaults() {
        let config = base_config(StoreKind::Mongodb);
        assert_eq!(config.store.port, 27017);
        assert_eq!(config.store.db_name, "dbA");
        assert_eq!(config.store.source, "mongo-a");
        assert_eq!(config.cluster, "cluster2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_postgres_defaults() {
        let config = base_config(StoreKind::Postgresql);
        assert_eq!(config.store.port, 5432);
        assert_eq!(config.store.db_name, "db_a");
        assert_eq!(config.store.source, "postgres-a");
        assert_eq!(config.cluster, "cluster1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let store = StoreConfig::new(
            StoreKind::Mongodb,
            "mongo-b-svc".to_string(),
            Some(27018),
            Some("dbB".to_string()),
            None,
            None,
            Some("mongo-b".to_string()),
            Some("rs-b".to_string()),
        );
        assert_eq!(store.port, 27018);
        assert_eq!(store.db_name, "dbB");
        assert_eq!(store.user, "userA");
        assert_eq!(store.replica_set.as_deref(), Some("rs-b"));
    }

    #[test]
    fn test_validation_rejects_bad_endpoint() {
        let mut config = base_config(StoreKind::Mongodb);
        config.endpoint = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid endpoint URL"));
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let mut config = base_config(StoreKind::Postgresql);
        config.store.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_clamped_to_minimum() {
        let mut config = base_config(StoreKind::Mongodb);
        config.interval = Duration::from_millis(100);
        let config = config.clamp_interval();
        assert_eq!(config.interval, MIN_INTERVAL);
    }
}
