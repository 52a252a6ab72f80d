//! Append command.

use anyhow::{Context, Result};
use clap::Args;
use esfeed_core::model::Event;
use esfeed_core::store::EventStoreClient;
use uuid::Uuid;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct AppendArgs {
    /// Stream name
    stream: String,

    /// Event type
    #[arg(short = 't', long = "type")]
    event_type: String,

    /// Event payload; JSON is sent as JSON, anything else as a string
    #[arg(short, long, conflicts_with = "data_file")]
    data: Option<String>,

    /// Read the payload from a file
    #[arg(long)]
    data_file: Option<String>,

    /// Event metadata
    #[arg(short, long, default_value = "")]
    metadata: String,

    /// Event id (a random UUID when omitted)
    #[arg(long)]
    id: Option<Uuid>,
}

pub async fn execute(args: AppendArgs, client: &EventStoreClient, format: OutputFormat) -> Result<()> {
    let data = match (&args.data, &args.data_file) {
        (Some(data), _) => data.clone(),
        (None, Some(path)) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?
        }
        (None, None) => String::new(),
    };
    let event_id = args.id.unwrap_or_else(Uuid::new_v4).to_string();
    let event = Event::new(event_id.clone(), args.event_type.clone(), data, args.metadata);

    client.append_event(&args.stream, &event).await?;

    match format {
        OutputFormat::Table => {
            output::print_success(&format!("Appended {} to {}", args.event_type, args.stream));
            output::print_detail("Event ID", &event_id);
        }
        _ => output::print_item(
            &serde_json::json!({
                "stream": args.stream,
                "eventId": event_id,
                "eventType": args.event_type,
            }),
            format,
        )?,
    }
    Ok(())
}
