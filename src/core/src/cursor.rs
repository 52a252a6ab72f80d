//! Forward-only cursor over one stream.
//!
//! An [`EventCursor`] buffers forward slices and hands out envelopes in
//! ascending order. It can be positioned after a marker or a timestamp, but
//! only before the first read; afterwards the position is fixed.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::error::{FeedError, Result};
use crate::feed::payload::{event_number_from_title, event_number_from_uri, stream_name_from_uri};
use crate::feed::reader::SliceReader;
use crate::model::{EventEnvelope, Position};

/// Buffered forward reader over a single stream.
#[derive(Debug)]
pub struct EventCursor {
    reader: SliceReader,
    stream: String,
    page_size: u32,
    next_event_number: u64,
    buffer: VecDeque<EventEnvelope>,
    position: Position,
    started: bool,
}

impl EventCursor {
    pub fn new(reader: SliceReader, stream: impl Into<String>, page_size: u32) -> Self {
        Self {
            reader,
            stream: stream.into(),
            page_size: page_size.max(1),
            next_event_number: 0,
            buffer: VecDeque::new(),
            position: Position::Start,
            started: false,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Number the next forward slice starts at.
    pub fn next_event_number(&self) -> u64 {
        self.next_event_number
    }

    /// Whether the cursor has read from the store yet.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Envelopes loaded but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn ensure_not_started(&self, operation: &str) -> Result<()> {
        if self.started {
            return Err(FeedError::UnsupportedOperation(format!(
                "{} after reading from stream {} has begun",
                operation, self.stream
            )));
        }
        Ok(())
    }

    fn reposition(&mut self, next_event_number: u64, position: Position) {
        self.buffer.clear();
        self.next_event_number = next_event_number;
        self.position = position;
        debug!(stream = %self.stream, next_event_number, "Cursor positioned");
    }

    /// Start after the entry named by `marker`.
    ///
    /// The marker may be an entry title (`13@orders`), an entry URI or an
    /// event id.
    pub async fn set_after_event_id(&mut self, marker: &str) -> Result<()> {
        self.ensure_not_started("setAfterEventId")?;

        let direct = event_number_from_title(marker, &self.stream).or_else(|| {
            match stream_name_from_uri(marker) {
                Some(stream) if stream == self.stream => event_number_from_uri(marker),
                _ => None,
            }
        });
        let found = match direct {
            Some(number) => self.confirm_marker(marker, number).await?,
            None => self.scan_for_marker(marker).await?,
        };

        self.reposition(found + 1, Position::AfterEventId(marker.to_string()));
        Ok(())
    }

    /// The event a title or URI marker names must exist, or the cursor
    /// would start past the head and skip everything up to it.
    async fn confirm_marker(&self, marker: &str, event_number: u64) -> Result<u64> {
        match self.reader.read_event(&self.stream, event_number, "").await {
            Ok(event) => Ok(event.event_number()),
            Err(FeedError::EventNotFound { .. }) => Err(FeedError::MarkerNotFound {
                stream: self.stream.clone(),
                marker: marker.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn scan_for_marker(&self, marker: &str) -> Result<u64> {
        let mut from = 0;
        loop {
            let slice = self
                .reader
                .read_events_forward(&self.stream, from, self.page_size, "")
                .await?;
            if let Some(hit) = slice.events.iter().find(|e| e.matches_marker(marker)) {
                return Ok(hit.event_number());
            }
            if slice.end_of_stream || slice.next_event_number == from {
                return Err(FeedError::MarkerNotFound {
                    stream: self.stream.clone(),
                    marker: marker.to_string(),
                });
            }
            from = slice.next_event_number;
        }
    }

    /// Start at the first entry updated strictly after `timestamp`, or after
    /// the current head when there is none.
    pub async fn set_after_timestamp(&mut self, timestamp: DateTime<Utc>) -> Result<()> {
        self.ensure_not_started("setAfterTimestamp")?;

        let mut from = 0;
        let start = loop {
            let slice = self
                .reader
                .read_events_forward(&self.stream, from, self.page_size, "")
                .await?;
            let hit = slice
                .events
                .iter()
                .find(|e| e.updated.map_or(false, |updated| updated > timestamp));
            if let Some(hit) = hit {
                break hit.event_number();
            }
            if slice.end_of_stream || slice.next_event_number == from {
                break slice.next_event_number;
            }
            from = slice.next_event_number;
        };

        self.reposition(start, Position::AfterTimestamp(timestamp));
        Ok(())
    }

    /// Read one forward slice from the continuation number into the buffer.
    ///
    /// Returns how many envelopes were added; zero when the stream has not
    /// advanced.
    pub async fn load_next(&mut self) -> Result<usize> {
        self.started = true;
        let slice = self
            .reader
            .read_events_forward(&self.stream, self.next_event_number, self.page_size, "")
            .await?;

        let loaded = slice.events.len();
        self.next_event_number = slice.next_event_number;
        self.buffer.extend(slice.events);
        Ok(loaded)
    }

    /// Whether another envelope is available, loading a slice if the buffer
    /// is empty.
    pub async fn has_next(&mut self) -> Result<bool> {
        if self.buffer.is_empty() {
            self.load_next().await?;
        }
        Ok(!self.buffer.is_empty())
    }

    /// Next envelope without consuming it.
    pub async fn peek(&mut self) -> Result<Option<&EventEnvelope>> {
        if !self.has_next().await? {
            return Ok(None);
        }
        Ok(self.buffer.front())
    }

    /// Consume the next envelope.
    pub async fn next(&mut self) -> Result<EventEnvelope> {
        if !self.has_next().await? {
            return Err(FeedError::NoSuchElement {
                stream: self.stream.clone(),
            });
        }
        self.buffer.pop_front().ok_or_else(|| FeedError::NoSuchElement {
            stream: self.stream.clone(),
        })
    }

    /// Drain everything available right now.
    pub async fn collect_remaining(&mut self) -> Result<Vec<EventEnvelope>> {
        let mut events = Vec::new();
        while self.has_next().await? {
            events.push(self.next().await?);
        }
        Ok(events)
    }
}
