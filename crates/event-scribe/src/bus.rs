//! The host event bus seam.
//!
//! The sink only needs to attach and detach a handler on a named channel,
//! so it depends on the [`EventBus`] trait rather than a concrete bus.
//! [`LocalBus`] is a small synchronous in-process implementation for hosts
//! that do not already have one, and for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::value::Value;

/// Callback invoked for every event published on a channel, with the
/// publisher's tag and the event.
pub type Handler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Identifies one subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub trait EventBus: Send + Sync {
    fn subscribe(&self, channel: &str, handler: Handler) -> SubscriptionId;

    /// Remove a subscription. Returns `false` if it was not registered on
    /// `channel` (already removed, or never added).
    fn unsubscribe(&self, channel: &str, id: SubscriptionId) -> bool;
}

/// Synchronous in-process bus.
///
/// [`emit`](Self::emit) runs every handler on the calling thread, in
/// subscription order, before returning.
#[derive(Default)]
pub struct LocalBus {
    next_id: AtomicU64,
    channels: Mutex<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `data` on `channel`. Returns how many handlers ran.
    ///
    /// Handlers are snapshotted before dispatch, so a handler may
    /// unsubscribe (itself or others) without deadlocking the bus.
    pub fn emit(&self, channel: &str, tag: &str, data: &Value) -> usize {
        let handlers: Vec<Handler> = self
            .channels()
            .get(channel)
            .map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(tag, data);
        }
        handlers.len()
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels().get(channel).map_or(0, Vec::len)
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Vec<(SubscriptionId, Handler)>>> {
        // The map is never left half-updated, so a poisoned lock is usable.
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBus for LocalBus {
    fn subscribe(&self, channel: &str, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.channels()
            .entry(channel.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    fn unsubscribe(&self, channel: &str, id: SubscriptionId) -> bool {
        let mut channels = self.channels();
        let Some(subs) = channels.get_mut(channel) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(sub, _)| *sub != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            channels.remove(channel);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> Handler {
        let counter = Arc::clone(counter);
        Arc::new(move |_tag: &str, _data: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn emit_reaches_subscribers_of_that_channel_only() {
        let bus = LocalBus::new();
        let reports = Arc::new(AtomicUsize::new(0));
        let other = Arc::new(AtomicUsize::new(0));
        bus.subscribe("report", counting_handler(&reports));
        bus.subscribe("other", counting_handler(&other));

        assert_eq!(bus.emit("report", "request", &Value::Null), 1);
        assert_eq!(reports.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
        assert_eq!(bus.emit("nobody", "request", &Value::Null), 0);
    }

    #[test]
    fn handler_receives_tag_and_event() {
        let bus = LocalBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            "report",
            Arc::new(move |tag: &str, data: &Value| {
                sink.lock()
                    .unwrap()
                    .push((tag.to_owned(), data.get("id").and_then(|v| v.as_i64())));
            }),
        );

        let event = Value::from(serde_json::json!({"id": 9}));
        bus.emit("report", "request", &event);
        assert_eq!(*seen.lock().unwrap(), vec![("request".to_owned(), Some(9))]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = LocalBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = bus.subscribe("report", counting_handler(&count));

        assert!(bus.unsubscribe("report", id));
        assert!(!bus.unsubscribe("report", id));
        assert_eq!(bus.listener_count("report"), 0);

        bus.emit("report", "request", &Value::Null);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_requires_matching_channel() {
        let bus = LocalBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = bus.subscribe("report", counting_handler(&count));
        assert!(!bus.unsubscribe("other", id));
        assert_eq!(bus.listener_count("report"), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_dispatch() {
        let bus = Arc::new(LocalBus::new());
        let own_id = Arc::new(Mutex::new(None));

        let handler: Handler = {
            let bus = Arc::clone(&bus);
            let own_id = Arc::clone(&own_id);
            Arc::new(move |_tag: &str, _data: &Value| {
                if let Some(id) = *own_id.lock().unwrap() {
                    bus.unsubscribe("report", id);
                }
            })
        };
        *own_id.lock().unwrap() = Some(bus.subscribe("report", handler));

        assert_eq!(bus.emit("report", "request", &Value::Null), 1);
        assert_eq!(bus.listener_count("report"), 0);
    }
}
