//! Event, feed and slice types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::payload::{event_number_from_uri, opaque};

/// An event as appended to a stream. Read-only to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub stream_id: String,
    pub event_id: String,
    #[serde(default)]
    pub event_number: u64,
    pub event_type: String,
    /// Serialized payload, kept verbatim
    #[serde(default)]
    pub data: String,
    /// Serialized side channel, kept verbatim
    #[serde(default)]
    pub metadata: String,
}

impl Event {
    /// Event ready to append; stream and number are assigned by the store.
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        data: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            stream_id: String::new(),
            event_id: event_id.into(),
            event_number: 0,
            event_type: event_type.into(),
            data: data.into(),
            metadata: metadata.into(),
        }
    }
}

/// Feed author block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub name: String,
}

/// An event hydrated from the feed together with its entry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Absolute URI of the entry
    pub id: String,
    /// `"{event_number}@{stream}"`
    pub title: String,
    pub author: Author,
    pub summary: String,
    pub updated: Option<DateTime<Utc>>,
    pub is_link_meta_data: bool,
    pub position_event_number: Option<u64>,
    pub position_stream_id: Option<String>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn event_number(&self) -> u64 {
        self.event.event_number
    }

    pub fn event_id(&self) -> &str {
        &self.event.event_id
    }

    pub fn stream_id(&self) -> &str {
        &self.event.stream_id
    }

    /// Whether `marker` names this envelope by title, entry id or event id.
    pub fn matches_marker(&self, marker: &str) -> bool {
        self.title == marker || self.id == marker || self.event.event_id == marker
    }

    /// Hydrate an envelope from an entry with an embedded body.
    ///
    /// Returns `None` when the entry carries no event number at all.
    pub fn from_entry(entry: Entry) -> Option<Self> {
        let event_number = entry.event_number()?;
        let stream_id = entry.stream_id.clone().unwrap_or_default();
        Some(Self {
            event: Event {
                stream_id,
                event_id: entry.event_id.unwrap_or_default(),
                event_number,
                event_type: entry.event_type.unwrap_or_default(),
                data: entry.data,
                metadata: entry.meta_data,
            },
            id: entry.id,
            title: entry.title,
            author: entry.author.unwrap_or_default(),
            summary: entry.summary.unwrap_or_default(),
            updated: entry.updated,
            is_link_meta_data: entry.is_link_meta_data,
            position_event_number: entry.position_event_number,
            position_stream_id: entry.position_stream_id,
        })
    }

    /// Overlay the feed metadata of `entry` onto a fully fetched event.
    ///
    /// Body fields (`data`, `metadata`) stay as fetched; identity and feed
    /// fields come from the entry wherever it has them.
    pub fn enrich(mut self, entry: &Entry) -> Self {
        if let Some(event_id) = &entry.event_id {
            self.event.event_id = event_id.clone();
        }
        if let Some(event_type) = &entry.event_type {
            self.event.event_type = event_type.clone();
        }
        if let Some(event_number) = entry.event_number() {
            self.event.event_number = event_number;
        }
        if let Some(stream_id) = &entry.stream_id {
            self.event.stream_id = stream_id.clone();
        }
        self.is_link_meta_data = entry.is_link_meta_data;
        self.position_event_number = entry.position_event_number;
        self.position_stream_id = entry.position_stream_id.clone();
        self.title = entry.title.clone();
        self.id = entry.id.clone();
        self.updated = entry.updated;
        if let Some(author) = &entry.author {
            self.author = author.clone();
        }
        if let Some(summary) = &entry.summary {
            self.summary = summary.clone();
        }
        self
    }
}

/// One item of a feed page, as sent by the store with `embed=body`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub event_number: Option<u64>,
    #[serde(default, deserialize_with = "opaque")]
    pub data: String,
    #[serde(default, alias = "metadata", deserialize_with = "opaque")]
    pub meta_data: String,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub is_link_meta_data: bool,
    #[serde(default)]
    pub position_event_number: Option<u64>,
    #[serde(default)]
    pub position_stream_id: Option<String>,
}

impl Entry {
    /// Event number from the body, falling back to the entry URI.
    pub fn event_number(&self) -> Option<u64> {
        self.event_number.or_else(|| event_number_from_uri(&self.id))
    }
}

/// A feed page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    #[serde(default)]
    pub head_of_stream: bool,
    /// Entries newest first, whatever the requested direction
    #[serde(default)]
    pub entries: Vec<Entry>,
}

/// Single-event document returned by `GET /streams/{stream}/{n}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    pub content: EventContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventContent {
    #[serde(default, alias = "streamId")]
    pub event_stream_id: String,
    #[serde(default)]
    pub event_number: u64,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default, deserialize_with = "opaque")]
    pub data: String,
    #[serde(default, alias = "metaData", deserialize_with = "opaque")]
    pub metadata: String,
}

impl From<EventDocument> for EventEnvelope {
    fn from(doc: EventDocument) -> Self {
        let stream_id = doc.content.event_stream_id;
        Self {
            event: Event {
                stream_id: stream_id.clone(),
                event_id: doc.content.event_id,
                event_number: doc.content.event_number,
                event_type: doc.content.event_type,
                data: doc.content.data,
                metadata: doc.content.metadata,
            },
            id: doc.id,
            title: doc.title,
            author: doc.author.unwrap_or_default(),
            summary: doc.summary.unwrap_or_default(),
            updated: doc.updated,
            is_link_meta_data: false,
            position_event_number: Some(doc.content.event_number),
            position_stream_id: Some(stream_id),
        }
    }
}

/// One page of a stream read with a single request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slice {
    /// Event number the request started at
    pub from_event_number: u64,
    /// Where the next page in the same direction starts
    pub next_event_number: u64,
    pub events: Vec<EventEnvelope>,
    pub end_of_stream: bool,
}

impl Slice {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Where an [`EventCursor`](crate::cursor::EventCursor) starts reading.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Start,
    /// After the entry named by a title, entry URI or event id
    AfterEventId(String),
    /// After the last entry updated at or before the timestamp
    AfterTimestamp(DateTime<Utc>),
}
