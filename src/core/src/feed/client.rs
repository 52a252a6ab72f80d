//! HTTP transport for the store's Atom surface.
//!
//! [`FeedClient`] owns one pooled keep-alive `reqwest::Client`, opened lazily
//! on first use and shared by every reader, cursor and subscription built on
//! top of it. It translates status codes into [`FeedError`]s and records a
//! read-time observation for every request.

use parking_lot::{Mutex, RwLock};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, HOST};
use reqwest::{Method, Request, Response, StatusCode, Url};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{BoxError, FeedError, Result};
use crate::feed::payload::{decode_body, event_number_from_uri, stream_name_from_uri};
use crate::feed::retry::{RetryPolicy, TransportFailure};
use crate::model::{Entry, EventDocument, EventEnvelope, Feed};
use crate::telemetry::{ReadKind, ReadTimer};

/// Media type of feed pages and single-event documents.
pub const ATOM_JSON: &str = "application/vnd.eventstore.atom+json";

/// Media type of append requests.
pub const EVENTS_JSON: &str = "application/vnd.eventstore.events+json";

/// Long-poll hint header, in seconds.
pub const LONG_POLL_HEADER: &str = "ES-LongPoll";

/// Pooled HTTP client for feed and event reads.
pub struct FeedClient {
    config: ClientConfig,
    base_url: Url,
    host_and_port: String,
    host: RwLock<String>,
    http: Mutex<Option<reqwest::Client>>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("base_url", &self.base_url.as_str())
            .field("identifier", &self.config.identifier)
            .field("host", &*self.host.read())
            .field("open", &self.is_open())
            .finish()
    }
}

impl FeedClient {
    /// Create a client; no connection is opened until the first request.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let base_url = Url::parse(&config.url)
            .map_err(|e| FeedError::Configuration(format!("invalid url {}: {}", config.url, e)))?;
        let host_name = base_url.host_str().unwrap_or_default().to_string();
        let host_and_port = format!(
            "{}:{}",
            host_name,
            base_url.port_or_known_default().unwrap_or_default()
        );
        let default_host = match base_url.port() {
            Some(port) => format!("{}:{}", host_name, port),
            None => host_name,
        };
        let host = config.host.clone().unwrap_or(default_host);
        let retry = RetryPolicy::new(&config.retry);
        let permits = Arc::new(Semaphore::new(config.max_connections_total));

        Ok(Self {
            config,
            base_url,
            host_and_port,
            host: RwLock::new(host),
            http: Mutex::new(None),
            permits,
            retry,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    /// `host:port` label used on read-time metrics.
    pub fn host_and_port(&self) -> &str {
        &self.host_and_port
    }

    /// Value sent in the `Host` header.
    pub fn host(&self) -> String {
        self.host.read().clone()
    }

    /// Route requests through a fixed virtual host while still connecting to
    /// the configured address.
    pub fn set_host(&self, host: impl Into<String>) {
        *self.host.write() = host.into();
    }

    pub fn is_open(&self) -> bool {
        self.http.lock().is_some()
    }

    /// Build the pooled client. Calling it again is a no-op.
    pub fn open(&self) -> Result<()> {
        let mut http = self.http.lock();
        if http.is_some() {
            return Ok(());
        }

        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout())
            .timeout(self.config.socket_timeout())
            .pool_max_idle_per_host(self.config.max_connections_per_route)
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| FeedError::Configuration(format!("cannot build http client: {}", e)))?;

        debug!(url = %self.base_url, identifier = %self.config.identifier, "Opened feed client");
        *http = Some(client);
        Ok(())
    }

    /// Drop the pooled client; the next request opens a new one.
    pub fn close(&self) {
        if self.http.lock().take().is_some() {
            debug!(url = %self.base_url, "Closed feed client");
        }
    }

    fn ensure_open(&self) -> Result<reqwest::Client> {
        self.open()?;
        self.http
            .lock()
            .clone()
            .ok_or_else(|| FeedError::Configuration("http client closed concurrently".into()))
    }

    /// Absolute URI for `path` on the configured store.
    pub fn uri(&self, path: &str) -> Url {
        let mut uri = self.base_url.clone();
        uri.set_path(path);
        uri.set_query(None);
        uri
    }

    fn read_request(&self, client: &reqwest::Client, uri: &Url) -> std::result::Result<Request, reqwest::Error> {
        let mut uri = uri.clone();
        uri.set_query(Some("embed=body"));

        let mut builder = client
            .get(uri)
            .header(ACCEPT_ENCODING, "gzip")
            .header(ACCEPT, ATOM_JSON)
            .header(LONG_POLL_HEADER, self.config.long_poll_secs.to_string())
            .header(HOST, self.host());
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }
        builder.build()
    }

    /// Send `request`, waiting for a pool permit first and retrying transport
    /// failures the retry policy allows.
    async fn execute(&self, client: &reqwest::Client, request: Request) -> std::result::Result<Response, BoxError> {
        let _permit = tokio::time::timeout(
            self.config.connection_request_timeout(),
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timeout waiting for connection from pool",
            )
        })??;

        let method = request.method().clone();
        let mut execution_count = 0;
        loop {
            let attempt = request
                .try_clone()
                .ok_or("request body cannot be replayed")?;
            execution_count += 1;
            match client.execute(attempt).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    let failure = TransportFailure::classify(&error);
                    if !self.retry.should_retry(&method, failure, execution_count) {
                        return Err(error.into());
                    }
                }
            }
        }
    }

    async fn body_of(response: Response) -> std::result::Result<Vec<u8>, BoxError> {
        let encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok(decode_body(encoding.as_deref(), &bytes)?)
    }

    /// Read one feed page.
    ///
    /// `message` names the calling operation and ends up in `ReadFailed`
    /// errors; `trace` is an optional caller-supplied correlation string.
    pub async fn fetch_entries(&self, stream: &str, uri: &Url, message: &str, trace: &str) -> Result<Vec<Entry>> {
        let _timer = ReadTimer::start(ReadKind::Slice, self.identifier(), self.host_and_port());

        let client = self.ensure_open()?;
        let request = self
            .read_request(&client, uri)
            .map_err(|e| FeedError::read_failed(stream, message, e))?;
        let response = self
            .execute(&client, request)
            .await
            .map_err(|e| FeedError::read_failed(stream, message, e))?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = Self::body_of(response)
                    .await
                    .map_err(|e| FeedError::read_failed(stream, message, e))?;
                let feed: Feed = serde_json::from_slice(&body)
                    .map_err(|e| FeedError::read_failed(stream, message, e))?;
                info!(
                    trace = %trace,
                    entries = feed.entries.len(),
                    uri = %uri,
                    "Found entries in feed"
                );
                Ok(feed.entries)
            }
            StatusCode::NOT_FOUND => {
                warn!(trace = %trace, operation = %message, status = %status, "Stream not found");
                Err(FeedError::stream_not_found(stream))
            }
            StatusCode::GONE => {
                warn!(trace = %trace, operation = %message, status = %status, "Stream was hard deleted");
                Err(FeedError::stream_deleted(stream))
            }
            _ => {
                warn!(trace = %trace, operation = %message, status = %status, "Unexpected feed response");
                Err(FeedError::unknown_response(stream, status))
            }
        }
    }

    /// Read one event by its absolute URI, e.g. `http://host/streams/orders/2`.
    pub async fn fetch_single_event(&self, uri: &str, trace: &str) -> Result<EventEnvelope> {
        let message = format!("readEvent({})", uri);
        let stream = stream_name_from_uri(uri).ok_or_else(|| {
            FeedError::read_failed(
                uri,
                message.as_str(),
                format!("failed to extract stream name from {}", uri),
            )
        })?;

        let _timer = ReadTimer::start(ReadKind::Event, self.identifier(), self.host_and_port());

        let parsed = Url::parse(uri).map_err(|e| FeedError::read_failed(&stream, message.as_str(), e))?;
        let client = self.ensure_open()?;
        let request = self
            .read_request(&client, &parsed)
            .map_err(|e| FeedError::read_failed(&stream, message.as_str(), e))?;
        let response = self
            .execute(&client, request)
            .await
            .map_err(|e| FeedError::read_failed(&stream, message.as_str(), e))?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = Self::body_of(response)
                    .await
                    .map_err(|e| FeedError::read_failed(&stream, message.as_str(), e))?;
                let document: EventDocument = serde_json::from_slice(&body)
                    .map_err(|e| FeedError::read_failed(&stream, message.as_str(), e))?;
                let event = EventEnvelope::from(document);
                info!(trace = %trace, uri = %uri, event_number = event.event_number(), "Read event");
                Ok(event)
            }
            StatusCode::NOT_FOUND => {
                warn!(trace = %trace, operation = %message, status = %status, "Event not found");
                let event_number = event_number_from_uri(uri).ok_or_else(|| {
                    FeedError::read_failed(
                        &stream,
                        message.as_str(),
                        format!("failed to extract event number from {}", uri),
                    )
                })?;
                Err(FeedError::event_not_found(stream, event_number))
            }
            _ => {
                warn!(trace = %trace, operation = %message, status = %status, "Unexpected event response");
                Err(FeedError::unknown_response(stream, status))
            }
        }
    }

    /// Post a batch in the store's events media type to `/streams/{stream}`.
    pub async fn post_events(&self, stream: &str, body: &serde_json::Value) -> Result<()> {
        let message = format!("appendEvents({})", stream);
        let uri = self.uri(&format!("/streams/{}", stream));
        let client = self.ensure_open()?;

        // Set before `json` so it is not replaced by `application/json`.
        let mut builder = client
            .request(Method::POST, uri)
            .header(CONTENT_TYPE, EVENTS_JSON)
            .header(HOST, self.host())
            .json(body);
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }
        let request = builder
            .build()
            .map_err(|e| FeedError::append_failed(stream, message.as_str(), e))?;
        let response = self
            .execute(&client, request)
            .await
            .map_err(|e| FeedError::append_failed(stream, message.as_str(), e))?;

        let status = response.status();
        if status.is_success() {
            debug!(stream = %stream, status = %status, "Appended events");
            return Ok(());
        }
        warn!(operation = %message, status = %status, "Append rejected");
        match status {
            StatusCode::GONE => Err(FeedError::stream_deleted(stream)),
            _ => Err(FeedError::unknown_response(stream, status)),
        }
    }
}
