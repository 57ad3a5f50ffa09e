use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use issue_pilot::events::{Event, EventBus, EventType};

fn event(event_type: EventType) -> Event {
    Event::new(event_type, "test-lane", json!({"k": "v"}))
}

#[tokio::test]
async fn test_publish_sync_delivers_in_subscription_order_before_returning() {
    let bus = EventBus::new();
    let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let seen_a = Arc::clone(&seen);
    bus.subscribe(EventType::PhaseChange, move |_| {
        seen_a.lock().unwrap().push("first");
    });
    let seen_b = Arc::clone(&seen);
    bus.subscribe(EventType::PhaseChange, move |_| {
        seen_b.lock().unwrap().push("second");
    });

    bus.publish_sync(event(EventType::PhaseChange));

    // All handlers ran by the time publish_sync returned, in order
    assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_publish_returns_without_waiting_but_delivers_exactly_once() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));

    let count_handler = Arc::clone(&count);
    bus.subscribe(EventType::JobCompleted, move |_| {
        count_handler.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(event(EventType::JobCompleted));
    // Spawned handlers have not been polled yet on this runtime
    assert_eq!(count.load(Ordering::SeqCst), 0);

    bus.publish(event(EventType::JobCompleted));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Both publishes delivered, once each
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_only_matching_type_receives() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));

    let count_handler = Arc::clone(&count);
    bus.subscribe(EventType::JobFailed, move |_| {
        count_handler.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish_sync(event(EventType::PhaseChange));
    bus.publish_sync(event(EventType::ProgressUpdate));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    bus.publish_sync(event(EventType::JobFailed));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_subscription_runs_twice() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let count_handler = Arc::clone(&count);
        bus.subscribe(EventType::ProgressUpdate, move |_| {
            count_handler.fetch_add(1, Ordering::SeqCst);
        });
    }

    bus.publish_sync(event(EventType::ProgressUpdate));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_reentrant_publish_from_handler_does_not_deadlock() {
    let bus = EventBus::new();
    let inner_ran = Arc::new(AtomicUsize::new(0));

    let bus_inner = bus.clone();
    bus.subscribe(EventType::PhaseChange, move |_| {
        // Handlers may publish further events; the bus must not hold its
        // lock while invoking us
        bus_inner.publish_sync(event(EventType::ProgressUpdate));
    });

    let inner_handler = Arc::clone(&inner_ran);
    bus.subscribe(EventType::ProgressUpdate, move |_| {
        inner_handler.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish_sync(event(EventType::PhaseChange));
    assert_eq!(inner_ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_handler_does_not_block_others_or_publisher() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));

    bus.subscribe(EventType::JobFailed, |_| {
        panic!("handler exploded");
    });
    let count_handler = Arc::clone(&count);
    bus.subscribe(EventType::JobFailed, move |_| {
        count_handler.fetch_add(1, Ordering::SeqCst);
    });

    // Must not propagate the panic to us
    bus.publish_sync(event(EventType::JobFailed));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_publish_stamps_timestamp_when_absent() {
    let bus = EventBus::new();
    let stamped = Arc::new(AtomicUsize::new(0));

    let stamped_handler = Arc::clone(&stamped);
    bus.subscribe(EventType::PhaseChange, move |e| {
        if e.timestamp.is_some() {
            stamped_handler.fetch_add(1, Ordering::SeqCst);
        }
    });

    bus.publish_sync(event(EventType::PhaseChange));
    assert_eq!(stamped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_preset_timestamp_is_preserved() {
    let bus = EventBus::new();
    let preserved: Arc<Mutex<Option<chrono::DateTime<chrono::Utc>>>> =
        Arc::new(Mutex::new(None));

    let preserved_handler = Arc::clone(&preserved);
    bus.subscribe(EventType::PhaseChange, move |e| {
        *preserved_handler.lock().unwrap() = e.timestamp;
    });

    let fixed = chrono::DateTime::parse_from_rfc3339("2026-02-10T00:00:00+00:00")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let mut e = event(EventType::PhaseChange);
    e.timestamp = Some(fixed);
    bus.publish_sync(e);

    assert_eq!(*preserved.lock().unwrap(), Some(fixed));
}
