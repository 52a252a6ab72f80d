//! Read commands: slices, single events and the head of a stream.

use anyhow::Result;
use clap::Args;
use esfeed_core::store::EventStoreClient;

use crate::output::{self, EventRow, OutputFormat};

#[derive(Args)]
pub struct ReadArgs {
    /// Stream name
    stream: String,

    /// First event number (defaults to 0 forward, the head backward)
    #[arg(short, long)]
    from: Option<u64>,

    /// Events per slice
    #[arg(short = 'n', long, default_value = "20")]
    count: u32,

    /// Read newest first
    #[arg(short, long)]
    backward: bool,

    /// Keep reading slices until the end of the stream
    #[arg(short, long)]
    all: bool,
}

#[derive(Args)]
pub struct EventArgs {
    /// Stream name
    stream: String,

    /// Event number
    number: u64,
}

#[derive(Args)]
pub struct LastArgs {
    /// Stream name
    stream: String,
}

pub async fn read(args: ReadArgs, client: &EventStoreClient, format: OutputFormat) -> Result<()> {
    let mut rows = Vec::new();

    let mut slice = if args.backward {
        let from = match args.from {
            Some(from) => from,
            None => client.read_head_event_number(&args.stream).await?,
        };
        client.read_events_backward(&args.stream, from, args.count).await?
    } else {
        client
            .read_events_forward(&args.stream, args.from.unwrap_or(0), args.count)
            .await?
    };
    rows.extend(slice.events.iter().map(EventRow::from));

    while args.all && !slice.end_of_stream {
        slice = if args.backward {
            client
                .read_events_backward_after(&args.stream, Some(&slice), args.count)
                .await?
        } else {
            client
                .read_events_forward(&args.stream, slice.next_event_number, args.count)
                .await?
        };
        rows.extend(slice.events.iter().map(EventRow::from));
    }

    output::print_list(&rows, format)?;
    if matches!(format, output::OutputFormat::Table) && !args.all && !slice.end_of_stream {
        output::print_info(&format!(
            "More events available; continue with --from {}",
            slice.next_event_number
        ));
    }
    Ok(())
}

pub async fn event(args: EventArgs, client: &EventStoreClient, format: OutputFormat) -> Result<()> {
    let envelope = client.read_event(&args.stream, args.number).await?;
    output::print_event(&envelope, format)
}

pub async fn last(args: LastArgs, client: &EventStoreClient, format: OutputFormat) -> Result<()> {
    let envelope = client.read_last_event(&args.stream).await?;
    output::print_event(&envelope, format)
}
