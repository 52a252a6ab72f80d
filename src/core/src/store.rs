//! Client facade over one event store.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::config::{ClientConfig, Config, SubscriptionConfig};
use crate::cursor::EventCursor;
use crate::error::{BoxError, Result};
use crate::feed::client::FeedClient;
use crate::feed::reader::SliceReader;
use crate::model::{Event, EventEnvelope, Slice};
use crate::subscription::{default_error_handler, CatchUpSubscription, ErrorHandler};

/// Entry point for reading, appending and subscribing.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct EventStoreClient {
    reader: SliceReader,
    page_size: u32,
    subscription: SubscriptionConfig,
}

impl EventStoreClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_subscription_config(config, SubscriptionConfig::default())
    }

    pub fn with_subscription_config(config: ClientConfig, subscription: SubscriptionConfig) -> Result<Self> {
        let page_size = config.page_size;
        let client = FeedClient::new(config)?;
        Ok(Self {
            reader: SliceReader::new(Arc::new(client)),
            page_size,
            subscription,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_subscription_config(config.client.clone(), config.subscription.clone())
    }

    pub fn feed_client(&self) -> &Arc<FeedClient> {
        self.reader.client()
    }

    pub fn reader(&self) -> &SliceReader {
        &self.reader
    }

    pub fn subscription_config(&self) -> &SubscriptionConfig {
        &self.subscription
    }

    /// Append one event to `stream`.
    ///
    /// An empty event id is replaced by a fresh UUID. `data` and `metadata`
    /// go out as JSON when they parse as JSON and as strings otherwise.
    pub async fn append_event(&self, stream: &str, event: &Event) -> Result<()> {
        let event_id = if event.event_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            event.event_id.clone()
        };

        let mut body = json!({
            "eventId": event_id,
            "eventType": event.event_type,
            "data": as_json_or_string(&event.data),
        });
        if !event.metadata.is_empty() {
            body["metadata"] = as_json_or_string(&event.metadata);
        }

        self.feed_client().post_events(stream, &Value::Array(vec![body])).await?;
        info!(stream = %stream, event_id = %event_id, event_type = %event.event_type, "Event appended");
        Ok(())
    }

    /// Cursor over `stream` from its first event.
    pub fn read_events(&self, stream: &str) -> EventCursor {
        EventCursor::new(self.reader.clone(), stream, self.page_size)
    }

    pub async fn read_events_forward(&self, stream: &str, from: u64, count: u32) -> Result<Slice> {
        self.reader.read_events_forward(stream, from, count, "").await
    }

    pub async fn read_events_backward(&self, stream: &str, from: u64, count: u32) -> Result<Slice> {
        self.reader.read_events_backward(stream, from, count, "").await
    }

    pub async fn read_events_backward_after(
        &self,
        stream: &str,
        previous: Option<&Slice>,
        count: u32,
    ) -> Result<Slice> {
        self.reader.read_events_backward_after(stream, previous, count, "").await
    }

    pub async fn read_event(&self, stream: &str, event_number: u64) -> Result<EventEnvelope> {
        self.reader.read_event(stream, event_number, "").await
    }

    pub async fn read_last_event(&self, stream: &str) -> Result<EventEnvelope> {
        self.reader.read_last_event(stream, "").await
    }

    pub async fn read_head_event_number(&self, stream: &str) -> Result<u64> {
        self.reader.read_head_event_number(stream, "").await
    }

    /// Subscription that reports failures through the default handler.
    pub fn new_catch_up_subscription<F>(&self, stream: &str, handler: F) -> CatchUpSubscription
    where
        F: Fn(&EventEnvelope) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.new_catch_up_subscription_with_error_handler(stream, handler, default_error_handler())
    }

    pub fn new_catch_up_subscription_with_error_handler<F>(
        &self,
        stream: &str,
        handler: F,
        error_handler: ErrorHandler,
    ) -> CatchUpSubscription
    where
        F: Fn(&EventEnvelope) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        CatchUpSubscription::new(
            self.reader.clone(),
            stream,
            self.page_size,
            &self.subscription,
            Arc::new(handler),
            error_handler,
        )
    }
}

fn as_json_or_string(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Event id in the form the store echoes back as a marker.
pub fn marker_for(envelope: &EventEnvelope) -> String {
    if envelope.title.is_empty() {
        format!("{}@{}", envelope.event_number(), envelope.stream_id())
    } else {
        envelope.title.clone()
    }
}
