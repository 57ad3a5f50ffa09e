use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::log_warn;

/// Event categories published by the runner and intake driver.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PhaseChange,
    JobCompleted,
    JobFailed,
    ProgressUpdate,
}

/// An immutable record of one state change. Consumers never mutate events;
/// `timestamp` is stamped at publish time when the producer left it unset.
#[derive(Clone, Debug)]
pub struct Event {
    pub event_type: EventType,
    /// Logical lane or batch the event belongs to (e.g. `"plan"`, `"exec"`).
    pub lane: String,
    pub data: serde_json::Value,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(event_type: EventType, lane: &str, data: serde_json::Value) -> Self {
        Self {
            event_type,
            lane: lane.to_string(),
            data,
            timestamp: None,
        }
    }
}

type EventHandler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Typed publish/subscribe hub with synchronous and asynchronous dispatch.
///
/// The subscriber map is locked only to register handlers and to snapshot
/// the matching list — never while a handler runs. Handlers may therefore
/// publish further events re-entrantly without deadlocking.
///
/// Uses `std::sync::Mutex` (not tokio's) because the guarded operations are
/// fast (push/clone) with no I/O under the lock.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<HashMap<EventType, Vec<EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event type. No deduplication: subscribing
    /// the same closure twice means it runs twice per publish.
    pub fn subscribe<F>(&self, event_type: EventType, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subs.entry(event_type).or_default().push(Arc::new(handler));
    }

    /// Fire-and-forget dispatch: every matching handler runs concurrently on
    /// its own spawned task and the caller returns immediately. No delivery
    /// order is guaranteed across handlers. Must be called from within a
    /// tokio runtime.
    pub fn publish(&self, event: Event) {
        let event = stamp(event);
        for handler in self.snapshot(event.event_type) {
            let event = event.clone();
            tokio::spawn(async move {
                invoke_guarded(&handler, &event);
            });
        }
    }

    /// Sequential dispatch on the caller's task, in subscription order.
    /// Returns only after every matching handler has run — used where the
    /// caller must observe handler side effects before proceeding.
    pub fn publish_sync(&self, event: Event) {
        let event = stamp(event);
        for handler in self.snapshot(event.event_type) {
            invoke_guarded(&handler, &event);
        }
    }

    fn snapshot(&self, event_type: EventType) -> Vec<EventHandler> {
        let subs = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subs.get(&event_type).cloned().unwrap_or_default()
    }
}

fn stamp(mut event: Event) -> Event {
    if event.timestamp.is_none() {
        event.timestamp = Some(Utc::now());
    }
    event
}

/// Invoke a handler, containing any panic so the remaining handlers still
/// run and the publisher never observes it.
fn invoke_guarded(handler: &EventHandler, event: &Event) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
        log_warn!(
            "Warning: event handler panicked on {:?} event for lane '{}'",
            event.event_type,
            event.lane
        );
    }
}
