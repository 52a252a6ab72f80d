//! Builds the event store client from configuration and flags.

use anyhow::{Context, Result};
use esfeed_core::config::Config;
use esfeed_core::store::EventStoreClient;

use crate::commands::config::CliConfig;

/// Connection options given on the command line.
#[derive(Debug, Default, Clone)]
pub struct ConnectOptions {
    pub url: Option<String>,
    pub config_file: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Resolve the effective configuration.
///
/// Precedence, lowest first: defaults, the config file (or `ESFEED__*`
/// variables), values saved with `esfeed config set`, then flags.
pub fn resolve_config(options: &ConnectOptions, saved: &CliConfig) -> Result<Config> {
    let mut config = match &options.config_file {
        Some(path) => Config::from_file(path).with_context(|| format!("Failed to load {}", path))?,
        None => Config::load().context("Failed to load configuration from environment")?,
    };

    saved.apply(&mut config)?;

    if let Some(url) = &options.url {
        config.client.url = url.clone();
    }
    if let Some(username) = &options.username {
        config.client.username = Some(username.clone());
    }
    if let Some(password) = &options.password {
        config.client.password = Some(password.clone());
    }
    if config.client.identifier.is_empty() {
        config.client.identifier = "esfeed-cli".to_string();
    }
    Ok(config)
}

pub fn connect(config: &Config) -> Result<EventStoreClient> {
    EventStoreClient::from_config(config)
        .with_context(|| format!("Invalid client configuration for {}", config.client.url))
}
