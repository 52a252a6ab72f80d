//! Tail command: follow a stream with a catch-up subscription.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use esfeed_core::error::{BoxError, FeedError};
use esfeed_core::model::EventEnvelope;
use esfeed_core::store::{marker_for, EventStoreClient};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::output::{self, EventRow, OutputFormat};

#[derive(Args)]
pub struct TailArgs {
    /// Stream name
    stream: String,

    /// Resume after this marker (`13@orders`, an entry URI or an event id)
    #[arg(long, conflicts_with = "after_timestamp")]
    after: Option<String>,

    /// Resume after this RFC 3339 timestamp
    #[arg(long)]
    after_timestamp: Option<DateTime<Utc>>,

    /// Only show events appended from now on
    #[arg(long, conflicts_with_all = ["after", "after_timestamp"])]
    new_only: bool,

    /// Stop after this many events
    #[arg(short, long)]
    limit: Option<u64>,
}

fn print_line(envelope: &EventEnvelope, format: OutputFormat) -> Result<(), BoxError> {
    match format {
        OutputFormat::Table => {
            let row = EventRow::from(envelope);
            println!("{:>8}  {:<24}  {}  {}", row.number, row.event_type, marker_for(envelope), row.data);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(envelope)?),
        OutputFormat::Yaml => print!("---\n{}", serde_yaml::to_string(envelope)?),
    }
    Ok(())
}

pub async fn execute(args: TailArgs, client: &EventStoreClient, format: OutputFormat) -> Result<()> {
    anyhow::ensure!(
        client.subscription_config().interval_millis > 0,
        "tail needs a positive polling interval (esfeed config set interval-millis 1000)"
    );

    let delivered = Arc::new(AtomicU64::new(0));
    let (done_tx, mut done_rx) = tokio::sync::watch::channel(false);
    let limit = args.limit;

    let counter = delivered.clone();
    let subscription = client.new_catch_up_subscription(&args.stream, move |envelope: &EventEnvelope| {
        if limit.is_some_and(|limit| counter.load(Ordering::Acquire) >= limit) {
            return Ok(());
        }
        print_line(envelope, format)?;
        let total = counter.fetch_add(1, Ordering::AcqRel) + 1;
        if limit == Some(total) {
            let _ = done_tx.send(true);
        }
        Ok(())
    });

    if let Some(timestamp) = args.after_timestamp {
        subscription.start_after_timestamp(timestamp).await?;
    } else if let Some(marker) = &args.after {
        subscription.start_after_event_id(marker).await?;
    } else if args.new_only {
        match client.read_head_event_number(&args.stream).await {
            Ok(head) => {
                subscription
                    .start_after_event_id(&format!("{}@{}", head, args.stream))
                    .await?
            }
            Err(FeedError::StreamNotFound { .. }) => subscription.start().await?,
            Err(e) => return Err(e.into()),
        }
    } else {
        subscription.start().await?;
    }

    if matches!(format, OutputFormat::Table) {
        output::print_info(&format!("Following {} ({}); Ctrl-C to stop", args.stream, subscription.state()));
    }
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = done_rx.wait_for(|done| *done) => {}
    }

    subscription.stop().await;
    if matches!(format, OutputFormat::Table) {
        output::print_success(&format!("{} events received", delivered.load(Ordering::Acquire)));
    }
    Ok(())
}
