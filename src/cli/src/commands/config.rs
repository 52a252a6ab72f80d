//! Configuration management commands.
//!
//! Stores CLI defaults in `~/.esfeed/config.toml`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use esfeed_core::config::Config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

/// Keys accepted by `config set`.
pub const KNOWN_KEYS: &[&str] = &[
    "url",
    "identifier",
    "host",
    "username",
    "password",
    "page-size",
    "long-poll-secs",
    "interval-millis",
];

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., url, page-size)
        key: String,
        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show saved values, or the fully resolved configuration
    Show {
        /// Print the effective configuration after files, env and flags
        #[arg(long)]
        effective: bool,
    },

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// Persistent CLI configuration stored on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl CliConfig {
    /// Overlay saved values onto `config`.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        for (key, value) in &self.values {
            match key.as_str() {
                "url" => config.client.url = value.clone(),
                "identifier" => config.client.identifier = value.clone(),
                "host" => config.client.host = Some(value.clone()),
                "username" => config.client.username = Some(value.clone()),
                "password" => config.client.password = Some(value.clone()),
                "page-size" => {
                    config.client.page_size = value
                        .parse()
                        .with_context(|| format!("page-size must be a number, got '{}'", value))?
                }
                "long-poll-secs" => {
                    config.client.long_poll_secs = value
                        .parse()
                        .with_context(|| format!("long-poll-secs must be a number, got '{}'", value))?
                }
                "interval-millis" => {
                    config.subscription.interval_millis = value
                        .parse()
                        .with_context(|| format!("interval-millis must be a number, got '{}'", value))?
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Return the path to the configuration file (`~/.esfeed/config.toml`).
fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".esfeed").join("config.toml"))
}

/// Load the CLI configuration from disk, returning defaults if the file does
/// not exist.
pub fn load_config() -> Result<CliConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg: CliConfig = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    Ok(cfg)
}

/// Save the CLI configuration to disk, creating the directory if needed.
fn save_config(cfg: &CliConfig) -> Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn masked(key: &str, value: &str) -> String {
    if key == "password" {
        "********".to_string()
    } else {
        value.to_string()
    }
}

pub async fn execute(cmd: ConfigCommands, effective: &Config, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                bail!("Unknown key '{}'; expected one of: {}", key, KNOWN_KEYS.join(", "));
            }
            let mut cfg = load_config()?;
            cfg.values.insert(key.clone(), value.clone());
            // Numeric keys must parse before they are saved.
            cfg.apply(&mut Config::default())?;
            save_config(&cfg)?;

            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, masked(&key, &value))),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": masked(&key, &value) }), format)?,
            }
        }

        ConfigCommands::Get { key } => {
            let cfg = load_config()?;
            match cfg.values.get(&key) {
                Some(value) => match format {
                    OutputFormat::Table => println!("{}", masked(&key, value)),
                    _ => output::print_item(
                        &serde_json::json!({ "key": key, "value": masked(&key, value) }),
                        format,
                    )?,
                },
                None => output::print_error(&format!("Key '{}' not found", key)),
            }
        }

        ConfigCommands::Show { effective: true } => {
            let mut shown = effective.clone();
            if shown.client.password.is_some() {
                shown.client.password = Some("********".to_string());
            }
            output::print_item(&shown, format)?;
        }

        ConfigCommands::Show { effective: false } => {
            let cfg = load_config()?;

            if cfg.values.is_empty() {
                output::print_info("No configuration values set.");
                return Ok(());
            }

            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    for (k, v) in &cfg.values {
                        output::print_detail(k, &masked(k, v));
                    }
                }
                _ => {
                    let values: BTreeMap<_, _> =
                        cfg.values.iter().map(|(k, v)| (k.clone(), masked(k, v))).collect();
                    output::print_item(&values, format)?;
                }
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This will reset all CLI configuration. Use --force to confirm.");
                return Ok(());
            }

            let path = config_path()?;
            if path.exists() {
                std::fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
            }

            output::print_success("Configuration reset to defaults");
        }
    }

    Ok(())
}
