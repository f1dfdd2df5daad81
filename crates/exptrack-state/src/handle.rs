//! SurrealDB Handle - Connection and Configuration
//!
//! Resolves where the registry's data lives and opens a connection with the
//! schema applied:
//! - remote (WebSocket) with database or root credentials
//! - an explicit engine URL (`mem://`, `surrealkv://...`, `ws://...`)
//! - a local `surrealkv` store under `.exptrack/db`

use std::time::Duration;

use crate::error::StateError;
use crate::migrations;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

/// Default namespace for exptrack data
pub const DEFAULT_NAMESPACE: &str = "exptrack";
/// Default database name
pub const DEFAULT_DATABASE: &str = "main";
/// Default local store, relative to the working directory
pub const DEFAULT_LOCAL_PATH: &str = ".exptrack/db";
/// Default bound on a single storage query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Configuration for a remote SurrealDB connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "exptrack")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create a new cloud configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set whether this is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "exptrack")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false") - set to "true" for root users
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// Read `EXPTRACK_QUERY_TIMEOUT_MS`, falling back to [`DEFAULT_QUERY_TIMEOUT`].
pub fn query_timeout_from_env() -> Result<Duration> {
    match std::env::var("EXPTRACK_QUERY_TIMEOUT_MS") {
        Ok(raw) => parse_timeout_ms(&raw),
        Err(_) => Ok(DEFAULT_QUERY_TIMEOUT),
    }
}

fn parse_timeout_ms(raw: &str) -> Result<Duration> {
    let ms: u64 = raw.trim().parse().map_err(|_| {
        StateError::Config(format!("EXPTRACK_QUERY_TIMEOUT_MS is not an integer: {raw}"))
    })?;
    if ms == 0 {
        return Err(StateError::Config(
            "EXPTRACK_QUERY_TIMEOUT_MS must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_millis(ms))
}

/// SurrealDB connection handle with the exptrack schema applied
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
    query_timeout: Duration,
}

impl SurrealHandle {
    /// Connect to SurrealDB in-memory and set up schema
    #[instrument(skip_all)]
    pub async fn setup_db() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::setup_url("mem://", DEFAULT_NAMESPACE, DEFAULT_DATABASE).await
    }

    /// Connect to an engine URL and set up schema
    #[instrument(skip(namespace, database))]
    pub async fn setup_url(url: &str, namespace: &str, database: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Self::finish(db).await
    }

    /// Connect to a remote SurrealDB with credentials
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn setup_cloud(config: CloudConfig) -> Result<Self> {
        info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {}", e))
            })?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        Self::finish(db).await
    }

    /// Connect using environment variables
    ///
    /// If SURREALDB_ENDPOINT is set, connects to the remote instance.
    /// If SURREALDB_URL is set, connects to that URL.
    /// Otherwise, falls back to a local surrealkv store in `.exptrack/db`.
    /// EXPTRACK_QUERY_TIMEOUT_MS overrides the per-query bound.
    #[instrument(skip_all)]
    pub async fn setup_from_env() -> Result<Self> {
        let timeout = query_timeout_from_env()?;

        let handle = if let Ok(config) = CloudConfig::from_env() {
            info!("Cloud config found, connecting to SurrealDB Cloud");
            Self::setup_cloud(config).await?
        } else if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            Self::setup_url(&url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?
        } else {
            std::fs::create_dir_all(DEFAULT_LOCAL_PATH).map_err(|e| {
                StateError::Connection(format!(
                    "Failed to create database directory {}: {}",
                    DEFAULT_LOCAL_PATH, e
                ))
            })?;
            let url = format!("surrealkv://{}", DEFAULT_LOCAL_PATH);
            info!("No cloud config or SURREALDB_URL found, using local persistence: {}", url);
            Self::setup_url(&url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?
        };

        Ok(handle.with_query_timeout(timeout))
    }

    async fn finish(db: Surreal<Any>) -> Result<Self> {
        migrations::init_schema(&db).await?;
        info!("SurrealDB connected and schema initialized");
        Ok(SurrealHandle {
            db,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        })
    }

    /// Override the per-query bound
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Per-query bound applied by repositories built on this handle
    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Underlying client
    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_parses_milliseconds() {
        assert_eq!(parse_timeout_ms("250").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_timeout_ms(" 10 ").unwrap(), Duration::from_millis(10));
    }

    #[test]
    fn timeout_rejects_zero_and_garbage() {
        assert!(matches!(parse_timeout_ms("0"), Err(StateError::Config(_))));
        assert!(matches!(parse_timeout_ms("soon"), Err(StateError::Config(_))));
    }

    #[test]
    fn cloud_config_defaults_namespace() {
        let config = CloudConfig::new("wss://db.example", "user", "pass").with_root(true);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert!(config.is_root);
    }

    #[tokio::test]
    async fn test_surreal_connection_and_schema_creation() {
        let handle = SurrealHandle::setup_db().await.unwrap();
        assert_eq!(handle.query_timeout(), DEFAULT_QUERY_TIMEOUT);
    }
}
