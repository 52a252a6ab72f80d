//! Integration tests for catch-up subscriptions.
//!
//! Tests cover:
//! - Manual passes from the start, after a marker and after a timestamp
//! - Pause and resume, including pausing from inside the handler
//! - Scheduled passes, concurrent restarts and stopping
//! - Bounded waits for passes that outlive the termination period
//! - Handler failures, error handlers and initialization errors

mod common;

use common::{append_events, stream_name, FakeStore};
use esfeed_core::error::{BoxError, FeedError};
use esfeed_core::model::EventEnvelope;
use esfeed_core::subscription::{
    CatchUpSubscription, SubscriptionState, CATCH_UP_ERROR_MESSAGE, INIT_ERROR_MESSAGE,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

fn recorder() -> (
    Arc<Mutex<Vec<u64>>>,
    impl Fn(&EventEnvelope) -> Result<(), BoxError> + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = move |event: &EventEnvelope| -> Result<(), BoxError> {
        sink.lock().push(event.event_number());
        Ok(())
    };
    (seen, handler)
}

/// Handler that records events and blocks on event 0 until released.
struct Gate {
    seen: Arc<Mutex<Vec<u64>>>,
    entered: Arc<AtomicBool>,
    release: mpsc::Sender<()>,
}

impl Gate {
    fn new() -> (
        Self,
        impl Fn(&EventEnvelope) -> Result<(), BoxError> + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let entered = Arc::new(AtomicBool::new(false));
        let (release, waiting) = mpsc::channel::<()>();
        let waiting = Mutex::new(waiting);

        let sink = seen.clone();
        let flag = entered.clone();
        let handler = move |event: &EventEnvelope| -> Result<(), BoxError> {
            if event.event_number() == 0 && !flag.swap(true, Ordering::SeqCst) {
                let _ = waiting.lock().recv_timeout(Duration::from_secs(5));
            }
            sink.lock().push(event.event_number());
            Ok(())
        };
        (Self { seen, entered, release }, handler)
    }

    async fn wait_until_entered(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !self.entered.load(Ordering::SeqCst) {
            assert!(tokio::time::Instant::now() < deadline, "handler was never entered");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn open(&self) {
        let _ = self.release.send(());
    }
}

async fn wait_for(seen: &Arc<Mutex<Vec<u64>>>, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while seen.lock().len() < count {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {count} events");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Manual Passes
// ============================================================================

#[tokio::test]
async fn test_catch_up_delivers_every_event_once() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("ten");
    append_events(&client, &stream, 10).await;

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription.start().await.unwrap();
    assert_eq!(subscription.catch_up().await.unwrap(), 10);
    assert_eq!(*seen.lock(), (0..10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_catch_up_after_marker_then_more_events() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("marker");
    append_events(&client, &stream, 75).await;

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription
        .start_after_event_id(&format!("13@{}", stream))
        .await
        .unwrap();
    subscription.catch_up().await.unwrap();
    assert_eq!(seen.lock().len(), 61);
    assert_eq!(seen.lock().first(), Some(&14));

    append_events(&client, &stream, 55).await;
    subscription.catch_up().await.unwrap();
    assert_eq!(seen.lock().len(), 116);
    assert_eq!(*seen.lock(), (14..130).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_repeated_catch_up_without_appends_delivers_nothing() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("unchanged");
    append_events(&client, &stream, 78).await;

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription.start().await.unwrap();
    subscription.catch_up().await.unwrap();
    assert_eq!(seen.lock().len(), 78);

    assert_eq!(subscription.catch_up().await.unwrap(), 0);
    assert_eq!(seen.lock().len(), 78);
}

#[tokio::test]
async fn test_catch_up_after_timestamp() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("timestamp");
    append_events(&client, &stream, 60).await;

    let timestamp = store.events(&stream)[50].updated;
    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription.start_after_timestamp(timestamp).await.unwrap();
    subscription.catch_up().await.unwrap();
    assert_eq!(*seen.lock(), (51..60).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_catch_up_without_start_binds_a_cursor() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("implicit-start");
    append_events(&client, &stream, 4).await;

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    assert_eq!(subscription.state(), SubscriptionState::Idle);

    subscription.catch_up().await.unwrap();
    assert_eq!(subscription.state(), SubscriptionState::Running);
    subscription.catch_up().await.unwrap();
    assert_eq!(seen.lock().len(), 4);
}

#[tokio::test]
async fn test_restart_begins_again_from_new_position() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("restart");
    append_events(&client, &stream, 10).await;

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription.start().await.unwrap();
    subscription.catch_up().await.unwrap();

    subscription
        .start_after_event_id(&format!("7@{}", stream))
        .await
        .unwrap();
    subscription.catch_up().await.unwrap();
    assert_eq!(seen.lock().len(), 12);
    assert_eq!(&seen.lock()[10..], &[8, 9]);
}

// ============================================================================
// Pause and Resume
// ============================================================================

#[tokio::test]
async fn test_paused_subscription_delivers_after_resume() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("paused");
    append_events(&client, &stream, 5).await;

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription.start().await.unwrap();
    subscription.set_paused(true);
    assert_eq!(subscription.state(), SubscriptionState::Paused);

    append_events(&client, &stream, 7).await;
    assert_eq!(subscription.catch_up().await.unwrap(), 0);
    assert!(seen.lock().is_empty());

    subscription.set_paused(false);
    subscription.catch_up().await.unwrap();
    assert_eq!(*seen.lock(), (0..12).collect::<Vec<u64>>());

    subscription.catch_up().await.unwrap();
    assert_eq!(seen.lock().len(), 12);
}

#[tokio::test]
async fn test_pausing_from_handler_stops_delivery_after_that_event() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("handler-pause");
    append_events(&client, &stream, 10).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let this: Arc<OnceLock<Weak<CatchUpSubscription>>> = Arc::new(OnceLock::new());
    let sink = seen.clone();
    let handle = this.clone();
    let subscription = Arc::new(client.new_catch_up_subscription(&stream, move |event: &EventEnvelope| {
        sink.lock().push(event.event_number());
        if event.event_number() == 4 {
            if let Some(subscription) = handle.get().and_then(Weak::upgrade) {
                subscription.set_paused(true);
            }
        }
        Ok(())
    }));
    let _ = this.set(Arc::downgrade(&subscription));

    subscription.start().await.unwrap();
    assert_eq!(subscription.catch_up().await.unwrap(), 5);
    assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    assert!(subscription.is_paused());

    assert_eq!(subscription.catch_up().await.unwrap(), 0);
    assert_eq!(seen.lock().len(), 5);

    subscription.set_paused(false);
    assert_eq!(subscription.catch_up().await.unwrap(), 5);
    assert_eq!(subscription.catch_up().await.unwrap(), 0);
    assert_eq!(*seen.lock(), (0..10).collect::<Vec<u64>>());
}

// ============================================================================
// Scheduled Passes
// ============================================================================

#[tokio::test]
async fn test_scheduled_passes_follow_the_stream() {
    let store = FakeStore::start().await;
    let client = store.polling_client(20);
    let stream = stream_name("scheduled");
    append_events(&client, &stream, 10).await;

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription.start().await.unwrap();
    wait_for(&seen, 10).await;

    append_events(&client, &stream, 5).await;
    wait_for(&seen, 15).await;

    subscription.stop().await;
    assert_eq!(subscription.state(), SubscriptionState::Stopped);
    assert_eq!(*seen.lock(), (0..15).collect::<Vec<u64>>());

    append_events(&client, &stream, 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.lock().len(), 15);
}

#[tokio::test]
async fn test_paused_schedule_delivers_nothing_until_resumed() {
    let store = FakeStore::start().await;
    let client = store.polling_client(20);
    let stream = stream_name("scheduled-pause");
    append_events(&client, &stream, 5).await;

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription.start().await.unwrap();
    wait_for(&seen, 5).await;

    subscription.set_paused(true);
    tokio::time::sleep(Duration::from_millis(50)).await;
    append_events(&client, &stream, 6).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(seen.lock().len(), 5);
    assert_eq!(subscription.state(), SubscriptionState::Paused);

    subscription.set_paused(false);
    wait_for(&seen, 11).await;
    subscription.stop().await;
    assert_eq!(*seen.lock(), (0..11).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_concurrent_restarts_leave_one_schedule() {
    let store = FakeStore::start().await;
    let client = store.polling_client(20);
    let stream = stream_name("concurrent-restart");
    append_events(&client, &stream, 5).await;
    let first_id = store.events(&stream)[0].event_id.clone();

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    let (a, b) = tokio::join!(
        subscription.start_after_event_id(&first_id),
        subscription.start_after_event_id(&first_id),
    );
    a.unwrap();
    b.unwrap();

    wait_for(&seen, 4).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    subscription.stop().await;
    assert_eq!(subscription.state(), SubscriptionState::Stopped);

    // The replaced start may have finished one pass before the restart.
    let at_stop = seen.lock().clone();
    assert!(at_stop.ends_with(&[1, 2, 3, 4]), "delivered {at_stop:?}");
    assert!(at_stop == [1, 2, 3, 4] || at_stop == [1, 2, 3, 4, 1, 2, 3, 4]);

    append_events(&client, &stream, 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*seen.lock(), at_stop);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_waits_at_most_the_termination_period() {
    let store = FakeStore::start().await;
    let client = store.polling_client(20);
    let stream = stream_name("slow-pass");
    append_events(&client, &stream, 3).await;

    let (gate, handler) = Gate::new();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription.set_catch_up_termination_period_millis(100);
    subscription.start().await.unwrap();
    gate.wait_until_entered().await;

    let began = tokio::time::Instant::now();
    tokio::time::timeout(Duration::from_secs(2), subscription.start())
        .await
        .expect("restart should not wait for the blocked pass")
        .unwrap();
    let waited = began.elapsed();
    assert!(waited >= Duration::from_millis(100), "waited only {waited:?}");
    assert!(waited < Duration::from_secs(2));
    assert!(gate.seen.lock().is_empty());

    gate.open();
    subscription.stop().await;
    assert_eq!(subscription.state(), SubscriptionState::Stopped);
}

#[tokio::test]
async fn test_scheduled_pass_survives_errors() {
    let store = FakeStore::start().await;
    let client = store.polling_client(20);
    let stream = stream_name("late-stream");

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    subscription.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    append_events(&client, &stream, 3).await;
    wait_for(&seen, 3).await;
    subscription.stop().await;
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_handler_failure_redelivers_on_next_pass() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("handler-failure");
    append_events(&client, &stream, 10).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let failed_once = Arc::new(AtomicBool::new(false));
    let sink = seen.clone();
    let flag = failed_once.clone();
    let subscription = client.new_catch_up_subscription(&stream, move |event: &EventEnvelope| {
        if event.event_number() == 5 && !flag.swap(true, Ordering::SeqCst) {
            return Err("transient failure".into());
        }
        sink.lock().push(event.event_number());
        Ok(())
    });
    subscription.start().await.unwrap();

    let err = subscription.catch_up().await.unwrap_err();
    match &err {
        FeedError::SubscriptionCallbackFailed { message, source } => {
            assert_eq!(message, CATCH_UP_ERROR_MESSAGE);
            assert!(matches!(**source, FeedError::HandlerFailed { event_number: 5, .. }));
        }
        other => panic!("expected SubscriptionCallbackFailed, got {other:?}"),
    }
    assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(subscription.state(), SubscriptionState::Running);

    subscription.catch_up().await.unwrap();
    assert_eq!(*seen.lock(), (0..10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_custom_error_handler_receives_failures() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("custom-handler");
    append_events(&client, &stream, 3).await;
    store.delete_stream(&stream);

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    let (_, handler) = recorder();
    let subscription = client.new_catch_up_subscription_with_error_handler(
        &stream,
        handler,
        Arc::new(move |message: &str, error: FeedError| -> esfeed_core::Result<()> {
            sink.lock().push((message.to_string(), error.is_terminal()));
            Ok(())
        }),
    );

    subscription.start().await.unwrap();
    assert_eq!(subscription.catch_up().await.unwrap(), 0);
    assert_eq!(*reported.lock(), vec![(CATCH_UP_ERROR_MESSAGE.to_string(), true)]);
}

#[tokio::test]
async fn test_initialization_error_is_reported() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("bad-marker");
    append_events(&client, &stream, 5).await;

    let (seen, handler) = recorder();
    let subscription = client.new_catch_up_subscription(&stream, handler);
    let err = subscription.start_after_event_id("unknown-id").await.unwrap_err();
    match err {
        FeedError::SubscriptionCallbackFailed { message, source } => {
            assert_eq!(message, INIT_ERROR_MESSAGE);
            assert!(matches!(*source, FeedError::MarkerNotFound { .. }));
        }
        other => panic!("expected SubscriptionCallbackFailed, got {other:?}"),
    }
    assert_eq!(subscription.state(), SubscriptionState::Idle);
    assert!(seen.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_pass_is_skipped_while_one_is_in_flight() {
    let store = FakeStore::start().await;
    let client = store.client();
    let stream = stream_name("overlap");
    append_events(&client, &stream, 40).await;

    let (gate, handler) = Gate::new();
    let subscription = Arc::new(client.new_catch_up_subscription(&stream, handler));
    subscription.start().await.unwrap();

    let first = {
        let subscription = subscription.clone();
        tokio::spawn(async move { subscription.catch_up().await })
    };
    gate.wait_until_entered().await;
    assert_eq!(subscription.state(), SubscriptionState::CatchingUp);

    let skipped = tokio::time::timeout(Duration::from_secs(1), subscription.catch_up())
        .await
        .expect("second pass should return immediately");
    assert_eq!(skipped.unwrap(), 0);

    gate.open();
    assert_eq!(first.await.unwrap().unwrap(), 40);
    assert_eq!(subscription.catch_up().await.unwrap(), 0);
    assert_eq!(*gate.seen.lock(), (0..40).collect::<Vec<u64>>());
}
