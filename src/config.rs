//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Store Connection
//!
//! - `MONGO_URI`: full connection string; overrides every other `MONGO_*` setting
//! - `MONGO_HOST`/`MONGO_PORT`/`MONGO_DB`: load balancer endpoint and database
//! - `MONGO_REPLICA_SET`: replica set name appended as `replicaSet=` (default: `rs0`)
//! - `MONGO_DIRECT_CONNECTION`: connect to a single node instead of a replica set
//! - `MONGO_USER`/`MONGO_PASSWORD`: optional credentials, percent-encoded into the URI
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_WINDOW_SECS`: sliding window length (default: 900)
//! - `RATE_LIMIT_MAX_REQUESTS`: requests per client per window (default: 100, 0 = disabled)

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{AppError, AppResult};

/// Document store implementation selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// MongoDB replica set behind a load balancer
    Mongo,
    /// Process-local store, for tests and local runs
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{other}' (expected mongo|memory)")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mongo => f.write_str("mongo"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json|pretty)")),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Service name reported by `/health` (default: "product-ingest")
    pub service_name: String,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Store Configuration
    // =========================================================================
    pub store_backend: StoreBackend,

    /// Explicit connection string, overrides the individual `MONGO_*` settings
    pub mongo_uri: Option<String>,

    pub mongo_host: String,
    pub mongo_port: u16,
    pub mongo_database: String,
    pub mongo_collection: String,
    pub mongo_replica_set: String,
    pub mongo_user: Option<String>,
    pub mongo_password: Option<String>,

    /// Connect to a single node, skipping replica set discovery
    pub mongo_direct_connection: bool,

    /// Timeout for the initial connection and ping (default: 10 seconds)
    pub connect_timeout: Duration,

    /// Timeout for a single insert (default: 5 seconds)
    pub insert_timeout: Duration,

    /// Timeout for a single find (default: 5 seconds)
    pub find_timeout: Duration,

    // =========================================================================
    // Store Retry Configuration
    // =========================================================================
    /// Retries after the first failed attempt (default: 0, fail fast)
    pub store_max_retries: u32,

    /// Base delay between retries (exponential backoff applies)
    pub store_retry_base_delay: Duration,

    /// Maximum delay between retries
    pub store_retry_max_delay: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Sliding window length (default: 15 minutes)
    pub rate_limit_window: Duration,

    /// Requests per client per window (default: 100)
    /// Set to 0 to disable rate limiting
    pub rate_limit_max_requests: usize,

    /// Interval for evicting idle limiter keys (default: 60 seconds, 0 = disabled)
    pub rate_limit_sweep_interval: Duration,

    // =========================================================================
    // Background Tasks
    // =========================================================================
    /// Interval for the product display loop (default: 3 seconds, 0 = disabled)
    pub display_interval: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "product-ingest".to_string()),
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,

            // Store
            store_backend: Self::parse_env_with("STORE_BACKEND", StoreBackend::Mongo)?,
            mongo_uri: Self::optional_env("MONGO_URI"),
            mongo_host: env::var("MONGO_HOST").unwrap_or_else(|_| "localhost".to_string()),
            mongo_port: Self::parse_env("MONGO_PORT", 27017)?,
            mongo_database: env::var("MONGO_DB").unwrap_or_else(|_| "appdb".to_string()),
            mongo_collection: env::var("MONGO_COLLECTION")
                .unwrap_or_else(|_| "products".to_string()),
            mongo_replica_set: env::var("MONGO_REPLICA_SET").unwrap_or_else(|_| "rs0".to_string()),
            mongo_user: Self::optional_env("MONGO_USER"),
            mongo_password: Self::optional_env("MONGO_PASSWORD"),
            mongo_direct_connection: Self::parse_env("MONGO_DIRECT_CONNECTION", false)?,
            connect_timeout: Duration::from_secs(Self::parse_env("CONNECT_TIMEOUT_SECS", 10)?),
            insert_timeout: Duration::from_secs(Self::parse_env("INSERT_TIMEOUT_SECS", 5)?),
            find_timeout: Duration::from_secs(Self::parse_env("FIND_TIMEOUT_SECS", 5)?),

            // Store retry
            store_max_retries: Self::parse_env("STORE_MAX_RETRIES", 0)?,
            store_retry_base_delay: Duration::from_millis(Self::parse_env(
                "STORE_RETRY_BASE_DELAY_MS",
                100,
            )?),
            store_retry_max_delay: Duration::from_millis(Self::parse_env(
                "STORE_RETRY_MAX_DELAY_MS",
                2000,
            )?),

            // Rate limiting
            rate_limit_window: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_WINDOW_SECS",
                900,
            )?),
            rate_limit_max_requests: Self::parse_env("RATE_LIMIT_MAX_REQUESTS", 100)?,
            rate_limit_sweep_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                60,
            )?),

            // Background tasks
            display_interval: Duration::from_secs(Self::parse_env("DISPLAY_INTERVAL_SECS", 3)?),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: Self::parse_env_with("LOG_FORMAT", LogFormat::Json)?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("CONNECT_TIMEOUT_SECS", self.connect_timeout),
            ("INSERT_TIMEOUT_SECS", self.insert_timeout),
            ("FIND_TIMEOUT_SECS", self.find_timeout),
        ] {
            if value.is_zero() {
                return Err(AppError::ConfigError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.rate_limiting_enabled() && self.rate_limit_window.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_WINDOW_SECS must be greater than 0 when rate limiting is enabled"
                    .to_string(),
            ));
        }

        if self.store_retry_base_delay > self.store_retry_max_delay {
            return Err(AppError::ConfigError(format!(
                "STORE_RETRY_BASE_DELAY_MS ({:?}) must be <= STORE_RETRY_MAX_DELAY_MS ({:?})",
                self.store_retry_base_delay, self.store_retry_max_delay
            )));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.store_backend == StoreBackend::Mongo {
            self.connection_uri()?;
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_max_requests > 0
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// MongoDB connection string for the configured endpoint.
    ///
    /// `MONGO_URI` is returned unchanged when set. Otherwise the URI is built
    /// as `mongodb://[user[:password]@]host:port/db?replicaSet=<name>`, or with
    /// `directConnection=true` in place of the replica set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the host cannot form a valid URI.
    pub fn connection_uri(&self) -> AppResult<String> {
        if let Some(uri) = &self.mongo_uri {
            return Ok(uri.clone());
        }

        let invalid = |e: &dyn fmt::Display| AppError::ConfigError(format!("Invalid MONGO_HOST: {e}"));

        let mut url = Url::parse(&format!(
            "mongodb://{}:{}/{}",
            self.mongo_host, self.mongo_port, self.mongo_database
        ))
        .map_err(|e| invalid(&e))?;

        if let Some(user) = &self.mongo_user {
            url.set_username(user)
                .map_err(|()| invalid(&"cannot carry credentials"))?;
            url.set_password(self.mongo_password.as_deref())
                .map_err(|()| invalid(&"cannot carry credentials"))?;
        }

        if self.mongo_direct_connection {
            url.query_pairs_mut().append_pair("directConnection", "true");
        } else if !self.mongo_replica_set.is_empty() {
            url.query_pairs_mut()
                .append_pair("replicaSet", &self.mongo_replica_set);
        }

        Ok(url.into())
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Like [`parse_env`](Self::parse_env), treating an empty value as unset.
    fn parse_env_with<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr<Err = String>,
    {
        match Self::optional_env(name) {
            Some(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            None => Ok(default),
        }
    }

    fn optional_env(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 8080,
            service_name: "product-ingest".to_string(),
            max_request_body_size: 1024 * 1024, // 1MB
            // Store
            store_backend: StoreBackend::Mongo,
            mongo_uri: None,
            mongo_host: "localhost".to_string(),
            mongo_port: 27017,
            mongo_database: "appdb".to_string(),
            mongo_collection: "products".to_string(),
            mongo_replica_set: "rs0".to_string(),
            mongo_user: None,
            mongo_password: None,
            mongo_direct_connection: false,
            connect_timeout: Duration::from_secs(10),
            insert_timeout: Duration::from_secs(5),
            find_timeout: Duration::from_secs(5),
            // Store retry
            store_max_retries: 0,
            store_retry_base_delay: Duration::from_millis(100),
            store_retry_max_delay: Duration::from_secs(2),
            // Rate limiting
            rate_limit_window: Duration::from_secs(900),
            rate_limit_max_requests: 100,
            rate_limit_sweep_interval: Duration::from_secs(60),
            // Background tasks
            display_interval: Duration::from_secs(3),
            // Observability
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_port: 9090,
        }
    }
}
