//! Slice reads over the Atom feed.
//!
//! The store lists entries newest first whichever direction is requested.
//! Forward slices are turned around so callers see ascending numbers;
//! backward slices keep the feed's descending order.

use std::sync::Arc;
use tracing::debug;

use crate::error::{FeedError, Result};
use crate::feed::client::FeedClient;
use crate::model::{Entry, EventEnvelope, Slice};

/// Direction of a slice read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirection {
    Forward,
    Backward,
}

impl ReadDirection {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// Continuation after a forward read of `count` from `from` that returned
/// `returned` entries.
pub(crate) fn forward_continuation(from: u64, count: u32, returned: usize) -> (u64, bool) {
    (from + returned as u64, count as usize > returned)
}

/// Continuation after a backward read of `count` from `from`.
pub(crate) fn backward_continuation(from: u64, count: u32) -> (u64, bool) {
    match from.checked_sub(count as u64) {
        Some(next) => (next, false),
        None => (0, true),
    }
}

/// Turn raw feed entries into envelopes in the order a direction reports.
pub(crate) fn order_entries(entries: Vec<Entry>, direction: ReadDirection) -> Vec<EventEnvelope> {
    let envelopes = entries.into_iter().filter_map(EventEnvelope::from_entry);
    match direction {
        ReadDirection::Forward => {
            let mut ascending: Vec<_> = envelopes.collect();
            ascending.reverse();
            ascending
        }
        ReadDirection::Backward => envelopes.collect(),
    }
}

/// Reads slices and single events of streams through a shared [`FeedClient`].
#[derive(Debug, Clone)]
pub struct SliceReader {
    client: Arc<FeedClient>,
}

impl SliceReader {
    pub fn new(client: Arc<FeedClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<FeedClient> {
        &self.client
    }

    async fn read_slice(
        &self,
        stream: &str,
        from: u64,
        count: u32,
        direction: ReadDirection,
        trace: &str,
    ) -> Result<Slice> {
        let message = match direction {
            ReadDirection::Forward => format!("readEventsForward({}, {}, {})", stream, from, count),
            ReadDirection::Backward => format!("readEventsBackward({}, {}, {})", stream, from, count),
        };
        let uri = self.client.uri(&format!(
            "/streams/{}/{}/{}/{}",
            stream,
            from,
            direction.as_str(),
            count
        ));

        let entries = self.client.fetch_entries(stream, &uri, &message, trace).await?;
        let returned = entries.len();
        let events = order_entries(entries, direction);
        let (next_event_number, end_of_stream) = match direction {
            ReadDirection::Forward => forward_continuation(from, count, returned),
            ReadDirection::Backward => backward_continuation(from, count),
        };

        debug!(
            stream = %stream,
            direction = direction.as_str(),
            from,
            count,
            returned,
            next_event_number,
            end_of_stream,
            "Read slice"
        );

        Ok(Slice {
            from_event_number: from,
            next_event_number,
            events,
            end_of_stream,
        })
    }

    /// Read up to `count` events starting at `from`, ascending.
    pub async fn read_events_forward(&self, stream: &str, from: u64, count: u32, trace: &str) -> Result<Slice> {
        self.read_slice(stream, from, count, ReadDirection::Forward, trace).await
    }

    /// Read up to `count` events from `from` downwards, descending.
    pub async fn read_events_backward(&self, stream: &str, from: u64, count: u32, trace: &str) -> Result<Slice> {
        self.read_slice(stream, from, count, ReadDirection::Backward, trace).await
    }

    /// Continue a backward scan where `previous` stopped.
    pub async fn read_events_backward_after(
        &self,
        stream: &str,
        previous: Option<&Slice>,
        count: u32,
        trace: &str,
    ) -> Result<Slice> {
        let from = previous.map(|slice| slice.next_event_number).unwrap_or(0);
        self.read_events_backward(stream, from, count, trace).await
    }

    /// Read the event at `event_number`.
    pub async fn read_event(&self, stream: &str, event_number: u64, trace: &str) -> Result<EventEnvelope> {
        let uri = self.client.uri(&format!("/streams/{}/{}", stream, event_number));
        self.client.fetch_single_event(uri.as_str(), trace).await
    }

    async fn head_entry(&self, stream: &str, trace: &str) -> Result<Entry> {
        let message = format!("readLastEvent({})", stream);
        let uri = self.client.uri(&format!("/streams/{}/head/backward/1", stream));
        self.client
            .fetch_entries(stream, &uri, &message, trace)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::stream_not_found(stream))
    }

    /// Read the newest event, fetched in full and carrying its feed metadata.
    pub async fn read_last_event(&self, stream: &str, trace: &str) -> Result<EventEnvelope> {
        let entry = self.head_entry(stream, trace).await?;
        let event = self.client.fetch_single_event(&entry.id, trace).await?;
        Ok(event.enrich(&entry))
    }

    /// Number of the newest event of `stream`.
    pub async fn read_head_event_number(&self, stream: &str, trace: &str) -> Result<u64> {
        let entry = self.head_entry(stream, trace).await?;
        entry.event_number().ok_or_else(|| {
            FeedError::read_failed(
                stream,
                format!("readHeadEventNumber({})", stream),
                format!("head entry {} carries no event number", entry.id),
            )
        })
    }
}
