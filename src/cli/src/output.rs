//! Output formatting utilities for the esfeed CLI.
//!
//! Supports table, JSON, and YAML output formats.

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use esfeed_core::model::EventEnvelope;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Output format selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as YAML
    Yaml,
}

/// Print a success message to stdout.
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}

/// Print an informational message to stdout.
pub fn print_info(msg: &str) {
    println!("{} {}", "[INFO]".blue().bold(), msg);
}

/// Table row for one event.
#[derive(Debug, Serialize, Tabled)]
pub struct EventRow {
    #[tabled(rename = "#")]
    pub number: u64,
    #[tabled(rename = "Type")]
    pub event_type: String,
    #[tabled(rename = "Event ID")]
    pub event_id: String,
    #[tabled(rename = "Updated")]
    pub updated: String,
    #[tabled(rename = "Data")]
    pub data: String,
}

const DATA_PREVIEW: usize = 48;

impl From<&EventEnvelope> for EventRow {
    fn from(envelope: &EventEnvelope) -> Self {
        let data = &envelope.event.data;
        let data = if data.chars().count() > DATA_PREVIEW {
            format!("{}…", data.chars().take(DATA_PREVIEW).collect::<String>())
        } else {
            data.clone()
        };
        Self {
            number: envelope.event_number(),
            event_type: envelope.event.event_type.clone(),
            event_id: envelope.event_id().to_string(),
            updated: envelope
                .updated
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            data,
        }
    }
}

/// Print a list of items in the requested format.
///
/// For table output, items must implement `Tabled`. For JSON/YAML, items must
/// implement `Serialize`.
pub fn print_list<T: Tabled + Serialize>(items: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No events found.".dimmed());
                return Ok(());
            }
            let table = Table::new(items)
                .with(Style::rounded())
                .with(Modify::new(Columns::first()).with(Alignment::right()))
                .to_string();
            println!("{}", table);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(items)?),
    }
    Ok(())
}

/// Print a single item in the requested format.
pub fn print_item<T: Serialize>(item: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(item)?);
        }
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(item)?),
    }
    Ok(())
}

/// Print one event in detail.
pub fn print_event(envelope: &EventEnvelope, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            print_header(&envelope.title);
            print_detail("Stream", envelope.stream_id());
            print_detail("Number", &envelope.event_number().to_string());
            print_detail("Type", &envelope.event.event_type);
            print_detail("Event ID", envelope.event_id());
            if let Some(updated) = envelope.updated {
                print_detail("Updated", &updated.to_rfc3339());
            }
            print_detail("URI", &envelope.id);
            print_detail("Data", &envelope.event.data);
            if !envelope.event.metadata.is_empty() {
                print_detail("Metadata", &envelope.event.metadata);
            }
            Ok(())
        }
        _ => print_item(envelope, format),
    }
}

/// Print key-value details to the terminal (non-JSON/YAML output).
pub fn print_detail(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

/// Print a section header.
pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}
