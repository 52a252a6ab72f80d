//! Configuration management.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FeedError, Result};
use crate::telemetry::{LoggingConfig, MetricsConfig};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Event store connection
    #[serde(default)]
    pub client: ClientConfig,

    /// Catch-up subscription defaults
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the event store, e.g. `http://127.0.0.1:2113`
    #[serde(default = "default_url")]
    pub url: String,

    /// Client identifier used as a metrics label
    #[serde(default)]
    pub identifier: String,

    /// Value of the `Host` header, when it must differ from the URL's host
    #[serde(default)]
    pub host: Option<String>,

    /// Basic auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Long-poll hint sent with every read, in seconds
    #[serde(default = "default_long_poll_secs")]
    pub long_poll_secs: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How long a request may wait for a free connection
    #[serde(default = "default_connection_request_timeout_ms")]
    pub connection_request_timeout_ms: u64,

    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,

    #[serde(default = "default_max_connections")]
    pub max_connections_per_route: usize,

    #[serde(default = "default_max_connections")]
    pub max_connections_total: usize,

    /// Events requested per forward slice by cursors
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Transport retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            identifier: String::new(),
            host: None,
            username: None,
            password: None,
            long_poll_secs: default_long_poll_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connection_request_timeout_ms: default_connection_request_timeout_ms(),
            socket_timeout_ms: default_socket_timeout_ms(),
            max_connections_per_route: default_max_connections(),
            max_connections_total: default_max_connections(),
            page_size: default_page_size(),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Config pointing at `url` with every other setting at its default.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connection_request_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_request_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(FeedError::Configuration("page_size must be positive".into()));
        }
        if self.max_connections_total == 0 || self.max_connections_per_route == 0 {
            return Err(FeedError::Configuration("connection limits must be positive".into()));
        }
        reqwest::Url::parse(&self.url)
            .map_err(|e| FeedError::Configuration(format!("invalid url {}: {}", self.url, e)))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum transport-level retries per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retry requests that may already have reached the server
    #[serde(default)]
    pub request_sent_retry_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            request_sent_retry_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Polling interval; zero or negative means manual catch-up only
    #[serde(default = "default_interval_millis")]
    pub interval_millis: i64,

    /// How long a restart waits for the in-flight pass of the old schedule
    #[serde(default = "default_termination_period_millis")]
    pub catch_up_termination_period_millis: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            interval_millis: default_interval_millis(),
            catch_up_termination_period_millis: default_termination_period_millis(),
        }
    }
}

// Default value functions
fn default_url() -> String { "http://127.0.0.1:2113".to_string() }
fn default_long_poll_secs() -> u32 { 30 }
fn default_connect_timeout_ms() -> u64 { 10_000 }
fn default_connection_request_timeout_ms() -> u64 { 10_000 }
fn default_socket_timeout_ms() -> u64 { 60_000 }
fn default_max_connections() -> usize { 1000 }
fn default_page_size() -> u32 { 20 }
fn default_max_retries() -> u32 { 3 }
fn default_interval_millis() -> i64 { 1000 }
fn default_termination_period_millis() -> u64 { 30_000 }

impl Config {
    /// Load configuration from environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ESFEED").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ESFEED").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}
