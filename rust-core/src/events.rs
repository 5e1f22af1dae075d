//! Event fan-out.
//!
//! Two delivery paths:
//! - [`EventBus`]: any number of state subscribers, each receiving the
//!   full [`NavigationState`] snapshot after every mutation.
//! - [`EventHandler`]: one per navigation session, receiving typed
//!   [`NavigationEvent`]s as the state machine makes decisions.
//!
//! Callbacks always run outside the navigator's state lock, so they may
//! call back into the navigator.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

use crate::model::{Destination, Route, Step};
use crate::state::{NavigationState, NavigationStatus};

/// Typed navigation events, in the order the state machine emits them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationEvent {
    StatusChanged {
        from: NavigationStatus,
        to: NavigationStatus,
    },
    RouteUpdated {
        route: Route,
    },
    StepChanged {
        index: usize,
        step: Step,
    },
    DistanceUpdated {
        distance_remaining: f64,
        time_remaining: f64,
        route_progress: f64,
    },
    Arrived {
        destination: Destination,
    },
    OffRoute {
        off_route: bool,
    },
}

/// Per-session event receiver supplied to `start_navigation`.
#[derive(Clone)]
pub struct EventHandler(Arc<dyn Fn(&NavigationEvent) + Send + Sync>);

impl EventHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&NavigationEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Handler that forwards every event into an unbounded channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NavigationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Self::new(move |event| {
            // Receiver gone means the consumer stopped listening
            let _ = tx.send(event.clone());
        });
        (handler, rx)
    }

    pub(crate) fn emit(&self, event: &NavigationEvent) {
        (self.0)(event)
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventHandler")
    }
}

type StateCallback = Arc<dyn Fn(&NavigationState) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    callbacks: BTreeMap<u64, StateCallback>,
}

/// Fan-out of state snapshots to independent subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Listeners>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state listener. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NavigationState) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.callbacks.insert(id, Arc::new(callback));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Notify every subscriber, in subscription order.
    pub(crate) fn publish(&self, state: &NavigationState) {
        let callbacks: Vec<StateCallback> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.callbacks.values().cloned().collect()
        };
        for callback in callbacks {
            callback(state);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.callbacks.len()
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Removal happens in Drop
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            let mut listeners = listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.callbacks.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_subscriber_is_notified() {
        let bus = EventBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let ca = a.clone();
        let _sa = bus.subscribe(move |_| {
            ca.fetch_add(1, Ordering::SeqCst);
        });
        let cb = b.clone();
        let _sb = bus.subscribe(move |_| {
            cb.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&NavigationState::default());
        bus.publish(&NavigationState::default());

        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let c1 = hits.clone();
        let first = bus.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = hits.clone();
        let _second = bus.subscribe(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        first.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(&NavigationState::default());
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn subscriber_may_subscribe_during_publish() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        let held = Arc::new(Mutex::new(Vec::new()));
        let held_in = held.clone();

        let _s = bus.subscribe(move |_| {
            let sub = inner_bus.subscribe(|_| {});
            held_in.lock().unwrap().push(sub);
        });

        bus.publish(&NavigationState::default());
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn channel_handler_forwards_events() {
        let (handler, mut rx) = EventHandler::channel();
        handler.emit(&NavigationEvent::OffRoute { off_route: true });
        assert_eq!(rx.try_recv().unwrap(), NavigationEvent::OffRoute { off_route: true });
    }

    #[test]
    fn event_json_is_tagged() {
        let event = NavigationEvent::StatusChanged {
            from: NavigationStatus::Idle,
            to: NavigationStatus::Calculating,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["to"], "calculating");
    }
}
