//! esfeed CLI - Command-line reader for HTTP Atom-feed event stores.
//!
//! Provides commands for reading slices and events, following streams,
//! appending events, and configuration management.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use esfeed_core::telemetry::{init_logging, init_metrics};

use commands::{append, config, read, tail};
use output::OutputFormat;

/// esfeed - Atom-feed event store client
#[derive(Parser)]
#[command(
    name = "esfeed",
    version = "0.1.0",
    about = "esfeed - Atom-feed event store client",
    long_about = "Read, follow and append to streams of an event store over its HTTP Atom feed.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Event store URL
    #[arg(long, global = true, env = "ESFEED_URL")]
    url: Option<String>,

    /// Configuration file (toml, yaml or json)
    #[arg(short, long, global = true, env = "ESFEED_CONFIG")]
    config: Option<String>,

    /// Basic auth user
    #[arg(long, global = true, env = "ESFEED_USERNAME")]
    username: Option<String>,

    /// Basic auth password
    #[arg(long, global = true, env = "ESFEED_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log verbosity (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Print read-time metrics (Prometheus text) to stderr when done
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a slice of a stream
    Read(read::ReadArgs),

    /// Read one event by number
    Event(read::EventArgs),

    /// Read the newest event of a stream
    Last(read::LastArgs),

    /// Follow a stream and print new events as they arrive
    Tail(tail::TailArgs),

    /// Append an event to a stream
    Append(append::AppendArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let options = client::ConnectOptions {
        url: cli.url.clone(),
        config_file: cli.config.clone(),
        username: cli.username.clone(),
        password: cli.password.clone(),
    };
    let format = cli.output;

    let result = run(cli.command, cli.verbose, cli.metrics, &options, format).await;

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(
    command: Commands,
    verbose: u8,
    metrics: bool,
    options: &client::ConnectOptions,
    format: OutputFormat,
) -> Result<()> {
    let saved = config::load_config()?;
    let mut settings = client::resolve_config(options, &saved)?;

    match verbose {
        0 if std::env::var("RUST_LOG").is_err() => settings.logging.level = "warn".to_string(),
        0 => {}
        1 => settings.logging.level = "info".to_string(),
        2 => settings.logging.level = "debug".to_string(),
        _ => settings.logging.level = "trace".to_string(),
    }
    init_logging(&settings.logging)?;

    if let Commands::Config(cmd) = command {
        return config::execute(cmd, &settings, format).await;
    }

    if metrics {
        settings.metrics.enabled = true;
    }
    let registry = init_metrics(&settings.metrics)?;

    let client = client::connect(&settings)?;
    let result = match command {
        Commands::Read(args) => read::read(args, &client, format).await,
        Commands::Event(args) => read::event(args, &client, format).await,
        Commands::Last(args) => read::last(args, &client, format).await,
        Commands::Tail(args) => tail::execute(args, &client, format).await,
        Commands::Append(args) => append::execute(args, &client, format).await,
        Commands::Config(_) => Ok(()),
    };

    if registry.is_enabled() {
        eprint!("{}", registry.render());
    }
    result
}
