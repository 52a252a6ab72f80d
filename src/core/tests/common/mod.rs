//! In-process event store speaking the Atom feed dialect the client reads.
//!
//! Appends go through `POST /streams/{stream}`; reads serve forward and
//! backward pages (entries newest first), single events and deleted streams.

#![allow(dead_code)]

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use esfeed_core::config::{ClientConfig, SubscriptionConfig};
use esfeed_core::model::Event;
use esfeed_core::store::EventStoreClient;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const ATOM_JSON: &str = "application/vnd.eventstore.atom+json";

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub stream: String,
    pub number: u64,
    pub event_id: String,
    pub event_type: String,
    pub data: Value,
    pub metadata: Value,
    pub updated: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    streams: HashMap<String, Vec<StoredEvent>>,
    deleted: HashSet<String>,
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 3, 17, 10, 0, 0).unwrap()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

struct Shared {
    base: String,
    gzip: bool,
    state: Mutex<State>,
}

impl Shared {
    fn entry(&self, event: &StoredEvent) -> Value {
        json!({
            "eventId": event.event_id,
            "eventType": event.event_type,
            "eventNumber": event.number,
            "data": text_of(&event.data),
            "metaData": text_of(&event.metadata),
            "streamId": event.stream,
            "isJson": true,
            "isMetaData": !event.metadata.is_null(),
            "isLinkMetaData": false,
            "positionEventNumber": event.number,
            "positionStreamId": event.stream,
            "title": format!("{}@{}", event.number, event.stream),
            "id": format!("{}/streams/{}/{}", self.base, event.stream, event.number),
            "updated": event.updated.to_rfc3339_opts(SecondsFormat::Micros, true),
            "author": { "name": "EventStore" },
            "summary": event.event_type,
            "links": []
        })
    }

    fn document(&self, event: &StoredEvent) -> Value {
        json!({
            "title": format!("{}@{}", event.number, event.stream),
            "id": format!("{}/streams/{}/{}", self.base, event.stream, event.number),
            "updated": event.updated.to_rfc3339_opts(SecondsFormat::Micros, true),
            "author": { "name": "EventStore" },
            "summary": event.event_type,
            "content": {
                "eventStreamId": event.stream,
                "eventNumber": event.number,
                "eventType": event.event_type,
                "eventId": event.event_id,
                "data": event.data,
                "metadata": event.metadata
            }
        })
    }

    fn page(&self, entries: Vec<Value>, head: bool) -> Value {
        json!({
            "title": "Event stream",
            "headOfStream": head,
            "selfUrl": self.base,
            "entries": entries
        })
    }

    fn ok(&self, body: Value) -> ResponseTemplate {
        let bytes = serde_json::to_vec(&body).unwrap();
        if self.gzip {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&bytes).unwrap();
            ResponseTemplate::new(200)
                .insert_header("Content-Type", ATOM_JSON)
                .insert_header("Content-Encoding", "gzip")
                .set_body_bytes(encoder.finish().unwrap())
        } else {
            ResponseTemplate::new(200)
                .insert_header("Content-Type", ATOM_JSON)
                .set_body_bytes(bytes)
        }
    }

    fn read(&self, segments: &[&str]) -> ResponseTemplate {
        let state = self.state.lock();
        let stream = segments[0];
        if state.deleted.contains(stream) {
            return ResponseTemplate::new(410);
        }
        let Some(events) = state.streams.get(stream) else {
            return ResponseTemplate::new(404);
        };
        let last = events.len() as u64;

        match segments[1..] {
            [number] => match number.parse::<u64>() {
                Ok(n) if n < last => self.ok(self.document(&events[n as usize])),
                _ => ResponseTemplate::new(404),
            },
            ["head", "backward", count] => {
                let count: u64 = count.parse().unwrap_or(20);
                let entries = events
                    .iter()
                    .rev()
                    .take(count as usize)
                    .map(|e| self.entry(e))
                    .collect();
                self.ok(self.page(entries, true))
            }
            [from, "forward", count] => {
                let (Ok(from), Ok(count)) = (from.parse::<u64>(), count.parse::<u64>()) else {
                    return ResponseTemplate::new(400);
                };
                let end = (from + count).min(last);
                let entries = (from.min(last)..end)
                    .rev()
                    .map(|n| self.entry(&events[n as usize]))
                    .collect();
                self.ok(self.page(entries, end == last))
            }
            [from, "backward", count] => {
                let (Ok(from), Ok(count)) = (from.parse::<u64>(), count.parse::<u64>()) else {
                    return ResponseTemplate::new(400);
                };
                if last == 0 {
                    return self.ok(self.page(Vec::new(), true));
                }
                let top = from.min(last - 1);
                let bottom = (top + 1).saturating_sub(count);
                let entries = (bottom..=top)
                    .rev()
                    .map(|n| self.entry(&events[n as usize]))
                    .collect();
                self.ok(self.page(entries, top == last - 1))
            }
            _ => ResponseTemplate::new(400),
        }
    }

    fn append(&self, stream: &str, body: &[u8]) -> ResponseTemplate {
        let Ok(Value::Array(items)) = serde_json::from_slice::<Value>(body) else {
            return ResponseTemplate::new(400);
        };
        let mut state = self.state.lock();
        if state.deleted.contains(stream) {
            return ResponseTemplate::new(410);
        }
        let events = state.streams.entry(stream.to_string()).or_default();
        for item in items {
            let number = events.len() as u64;
            events.push(StoredEvent {
                stream: stream.to_string(),
                number,
                event_id: item["eventId"].as_str().unwrap_or_default().to_string(),
                event_type: item["eventType"].as_str().unwrap_or_default().to_string(),
                data: item["data"].clone(),
                metadata: item["metadata"].clone(),
                updated: base_time() + Duration::seconds(number as i64),
            });
        }
        ResponseTemplate::new(201)
    }
}

struct ReadResponder(Arc<Shared>);

impl Respond for ReadResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let path = request.url.path().trim_start_matches("/streams/").to_string();
        let segments: Vec<&str> = path.split('/').collect();
        self.0.read(&segments)
    }
}

struct AppendResponder(Arc<Shared>);

impl Respond for AppendResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let stream = request.url.path().trim_start_matches("/streams/").to_string();
        self.0.append(&stream, &request.body)
    }
}

/// Running fake store.
pub struct FakeStore {
    pub server: MockServer,
    shared: Arc<Shared>,
}

impl FakeStore {
    pub async fn start() -> Self {
        Self::start_with(false).await
    }

    pub async fn start_gzip() -> Self {
        Self::start_with(true).await
    }

    async fn start_with(gzip: bool) -> Self {
        let server = MockServer::start().await;
        let shared = Arc::new(Shared {
            base: server.uri(),
            gzip,
            state: Mutex::new(State::default()),
        });

        Mock::given(method("POST"))
            .and(path_regex(r"^/streams/[^/]+$"))
            .respond_with(AppendResponder(shared.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/streams/[^/]+/.+$"))
            .respond_with(ReadResponder(shared.clone()))
            .mount(&server)
            .await;

        Self { server, shared }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Client with manual catch-up only.
    pub fn client(&self) -> EventStoreClient {
        EventStoreClient::with_subscription_config(
            ClientConfig::with_url(self.uri()).with_identifier("test-reader"),
            SubscriptionConfig {
                interval_millis: -1,
                catch_up_termination_period_millis: 1_000,
            },
        )
        .unwrap()
    }

    /// Client polling every `interval_millis`.
    pub fn polling_client(&self, interval_millis: i64) -> EventStoreClient {
        EventStoreClient::with_subscription_config(
            ClientConfig::with_url(self.uri()),
            SubscriptionConfig {
                interval_millis,
                catch_up_termination_period_millis: 1_000,
            },
        )
        .unwrap()
    }

    pub fn delete_stream(&self, stream: &str) {
        self.shared.state.lock().deleted.insert(stream.to_string());
    }

    pub fn events(&self, stream: &str) -> Vec<StoredEvent> {
        self.shared
            .state
            .lock()
            .streams
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }
}

/// Event the way the tests append it.
pub fn test_event(n: u64) -> Event {
    Event::new(
        uuid::Uuid::new_v4().to_string(),
        "Testtype",
        format!(r#"{{"value":"{}"}}"#, n),
        r#"{"TEST":"TEST"}"#,
    )
}

/// Append `count` events to `stream` through the client.
pub async fn append_events(client: &EventStoreClient, stream: &str, count: u64) {
    for n in 0..count {
        client.append_event(stream, &test_event(n)).await.unwrap();
    }
}

/// Unique stream name per test.
pub fn stream_name(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}
