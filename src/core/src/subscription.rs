//! Catch-up subscriptions.
//!
//! A [`CatchUpSubscription`] polls one stream and hands every new event to a
//! handler, in ascending order, at most once per successful delivery. Passes
//! run on a fixed-delay Tokio schedule, or on demand through
//! [`CatchUpSubscription::catch_up`]. Both paths share an in-flight guard:
//! a pass that finds another one running is dropped, not queued.
//!
//! ```ignore
//! let subscription = store.new_catch_up_subscription("orders", |event| {
//!     println!("{}", event.title);
//!     Ok(())
//! });
//! subscription.start_after_event_id("13@orders").await?;
//! ```

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SubscriptionConfig;
use crate::cursor::EventCursor;
use crate::error::{BoxError, FeedError, Result};
use crate::feed::reader::SliceReader;
use crate::model::{EventEnvelope, Position};

/// Message passed to the error handler when positioning fails.
pub const INIT_ERROR_MESSAGE: &str = "Error initializing event stream.";

/// Message passed to the error handler when a pass fails.
pub const CATCH_UP_ERROR_MESSAGE: &str = "Error catching up to event stream.";

/// Receives each delivered event. Returning an error stops the pass and
/// leaves the event for the next one.
pub type EventHandler = Arc<dyn Fn(&EventEnvelope) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Receives positioning and pass failures. Returning `Ok` swallows them.
pub type ErrorHandler = Arc<dyn Fn(&str, FeedError) -> Result<()> + Send + Sync>;

/// Log the failure and hand it back as `SubscriptionCallbackFailed`.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|message: &str, error: FeedError| -> Result<()> {
        let failed = FeedError::callback_failed(message, error);
        failed.log();
        Err(failed)
    })
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Never started
    Idle,
    /// A cursor is bound
    Running,
    /// Bound but passes are skipped
    Paused,
    /// A pass is in flight
    CatchingUp,
    Stopped,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::CatchingUp => "catching_up",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Default)]
struct Flags {
    paused: AtomicBool,
    catching_up: AtomicBool,
}

/// Holds the in-flight flag for the duration of one pass.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One pass bound to one positioned cursor.
struct CatchUpTask {
    stream: String,
    cursor: tokio::sync::Mutex<EventCursor>,
    flags: Arc<Flags>,
    handler: EventHandler,
    error_handler: ErrorHandler,
}

impl CatchUpTask {
    async fn run(&self) -> Result<usize> {
        if self.flags.paused.load(Ordering::Acquire) {
            debug!(stream = %self.stream, "Subscription paused; skipping pass");
            return Ok(0);
        }
        let Some(_in_flight) = InFlight::acquire(&self.flags.catching_up) else {
            debug!(stream = %self.stream, "Catch-up already in flight; skipping pass");
            return Ok(0);
        };

        match self.deliver().await {
            Ok(delivered) => Ok(delivered),
            Err(error) => (self.error_handler)(CATCH_UP_ERROR_MESSAGE, error).map(|_| 0),
        }
    }

    async fn deliver(&self) -> Result<usize> {
        let mut cursor = self.cursor.lock().await;
        cursor.load_next().await?;

        let mut delivered = 0;
        while !self.flags.paused.load(Ordering::Acquire) {
            let outcome = match cursor.peek().await? {
                Some(envelope) => (self.handler)(envelope)
                    .map_err(|e| FeedError::handler_failed(&self.stream, envelope.event_number(), e)),
                None => break,
            };
            outcome?;
            cursor.next().await?;
            delivered += 1;
            counter!("esfeed_events_delivered_total", "stream" => self.stream.clone()).increment(1);
        }

        if delivered > 0 {
            info!(stream = %self.stream, delivered, next_event_number = cursor.next_event_number(), "Caught up");
        }
        Ok(delivered)
    }
}

struct Schedule {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    task: Option<Arc<CatchUpTask>>,
    schedule: Option<Schedule>,
    stopped: bool,
}

/// Polling consumer of one stream.
pub struct CatchUpSubscription {
    reader: SliceReader,
    stream: String,
    page_size: u32,
    interval_millis: i64,
    termination_period: Mutex<Duration>,
    handler: EventHandler,
    error_handler: ErrorHandler,
    flags: Arc<Flags>,
    inner: Mutex<Inner>,
    /// Held across a whole restart or stop.
    lifecycle: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for CatchUpSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatchUpSubscription")
            .field("stream", &self.stream)
            .field("interval_millis", &self.interval_millis)
            .field("state", &self.state())
            .finish()
    }
}

impl CatchUpSubscription {
    pub fn new(
        reader: SliceReader,
        stream: impl Into<String>,
        page_size: u32,
        config: &SubscriptionConfig,
        handler: EventHandler,
        error_handler: ErrorHandler,
    ) -> Self {
        Self {
            reader,
            stream: stream.into(),
            page_size,
            interval_millis: config.interval_millis,
            termination_period: Mutex::new(Duration::from_millis(config.catch_up_termination_period_millis)),
            handler,
            error_handler,
            flags: Arc::new(Flags::default()),
            inner: Mutex::new(Inner::default()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn state(&self) -> SubscriptionState {
        let inner = self.inner.lock();
        if inner.stopped {
            return SubscriptionState::Stopped;
        }
        if inner.task.is_none() {
            return SubscriptionState::Idle;
        }
        if self.flags.catching_up.load(Ordering::Acquire) {
            SubscriptionState::CatchingUp
        } else if self.flags.paused.load(Ordering::Acquire) {
            SubscriptionState::Paused
        } else {
            SubscriptionState::Running
        }
    }

    /// Deliver from the beginning of the stream.
    pub async fn start(&self) -> Result<()> {
        self.start_at(Position::Start).await
    }

    /// Deliver everything after the entry named by `marker`.
    pub async fn start_after_event_id(&self, marker: &str) -> Result<()> {
        self.start_at(Position::AfterEventId(marker.to_string())).await
    }

    /// Deliver everything updated after `timestamp`.
    pub async fn start_after_timestamp(&self, timestamp: DateTime<Utc>) -> Result<()> {
        self.start_at(Position::AfterTimestamp(timestamp)).await
    }

    async fn start_at(&self, position: Position) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.shutdown_schedule().await;
        self.flags.paused.store(false, Ordering::Release);

        let mut cursor = EventCursor::new(self.reader.clone(), self.stream.clone(), self.page_size);
        let positioned = match &position {
            Position::Start => Ok(()),
            Position::AfterEventId(marker) => cursor.set_after_event_id(marker).await,
            Position::AfterTimestamp(timestamp) => cursor.set_after_timestamp(*timestamp).await,
        };
        if let Err(error) = positioned {
            return (self.error_handler)(INIT_ERROR_MESSAGE, error);
        }

        let task = Arc::new(CatchUpTask {
            stream: self.stream.clone(),
            cursor: tokio::sync::Mutex::new(cursor),
            flags: self.flags.clone(),
            handler: self.handler.clone(),
            error_handler: self.error_handler.clone(),
        });

        let schedule = (self.interval_millis > 0).then(|| {
            spawn_schedule(task.clone(), Duration::from_millis(self.interval_millis as u64))
        });

        info!(
            stream = %self.stream,
            position = ?position,
            interval_millis = self.interval_millis,
            "Catch-up subscription started"
        );

        let displaced = {
            let mut inner = self.inner.lock();
            inner.task = Some(task);
            inner.stopped = false;
            std::mem::replace(&mut inner.schedule, schedule)
        };
        if let Some(displaced) = displaced {
            displaced.token.cancel();
        }
        Ok(())
    }

    /// Run one pass now. Starts the subscription if it was never started.
    ///
    /// Returns the number of events delivered by this pass.
    pub async fn catch_up(&self) -> Result<usize> {
        let task = self.inner.lock().task.clone();
        match task {
            Some(task) => task.run().await,
            None => self.start().await.map(|_| 0),
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.flags.paused.store(paused, Ordering::Release);
        debug!(stream = %self.stream, paused, "Subscription pause toggled");
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::Acquire)
    }

    /// How long a restart or stop waits for the running schedule to finish.
    pub fn set_catch_up_termination_period(&self, period: Duration) {
        *self.termination_period.lock() = period;
    }

    pub fn set_catch_up_termination_period_millis(&self, millis: u64) {
        self.set_catch_up_termination_period(Duration::from_millis(millis));
    }

    pub fn catch_up_termination_period(&self) -> Duration {
        *self.termination_period.lock()
    }

    /// Cancel the schedule and unbind the cursor.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.shutdown_schedule().await;
        let mut inner = self.inner.lock();
        inner.task = None;
        inner.stopped = true;
        info!(stream = %self.stream, "Catch-up subscription stopped");
    }

    async fn shutdown_schedule(&self) {
        let schedule = self.inner.lock().schedule.take();
        let Some(Schedule { token, handle }) = schedule else {
            return;
        };

        token.cancel();
        let period = self.catch_up_termination_period();
        match tokio::time::timeout(period, handle).await {
            Ok(Ok(())) => debug!(stream = %self.stream, "Catch-up schedule terminated"),
            Ok(Err(join_error)) => warn!(stream = %self.stream, error = %join_error, "Catch-up schedule panicked"),
            Err(_) => warn!(
                stream = %self.stream,
                period_ms = period.as_millis() as u64,
                "Catch-up schedule did not terminate in time; abandoning it"
            ),
        }
    }
}

impl Drop for CatchUpSubscription {
    fn drop(&mut self) {
        if let Some(schedule) = self.inner.get_mut().schedule.take() {
            schedule.token.cancel();
        }
    }
}

/// Fixed-delay loop: run a pass, then sleep `interval` unless cancelled.
fn spawn_schedule(task: Arc<CatchUpTask>, interval: Duration) -> Schedule {
    let token = CancellationToken::new();
    let cancelled = token.clone();

    let handle = tokio::spawn(async move {
        while !cancelled.is_cancelled() {
            if let Err(error) = task.run().await {
                error.log();
            }
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });

    Schedule { token, handle }
}
