//! Subscriber registry and event dispatch.
//!
//! Callbacks are never invoked inline with the read loop. Dispatching an
//! event enqueues it; a single worker task drains the queue and invokes the
//! subscribers registered for that kind in registration order. A panicking
//! subscriber is contained and the remaining subscribers still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use drivewire_protocol::{EventKind, RealtimeEvent, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

/// Callback signature for all subscriptions.
pub type EventCallback = Arc<dyn Fn(EventKind, StreamEvent) + Send + Sync + 'static>;

/// What a subscriber receives.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A decoded realtime event for one of the known kinds.
    Realtime(Arc<RealtimeEvent>),
    /// The raw value of a server-sent error packet.
    Error(Value),
    /// The connection closed; carries no payload.
    Closed,
}

struct Registry {
    subscribers: Mutex<HashMap<EventKind, Vec<(u64, EventCallback)>>>,
    next_token: AtomicU64,
}

impl Registry {
    fn add(&self, kind: EventKind, callback: EventCallback) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .entry(kind)
            .or_default()
            .push((token, callback));
        token
    }

    fn remove(&self, kind: EventKind, token: u64) {
        if let Some(entries) = self.subscribers.lock().get_mut(&kind) {
            entries.retain(|(t, _)| *t != token);
        }
    }

    fn snapshot(&self, kind: EventKind) -> Vec<EventCallback> {
        self.subscribers
            .lock()
            .get(&kind)
            .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }
}

/// Handle returned by a subscription; removal is keyed by an opaque token,
/// so registering the same callback twice yields independent handles.
pub struct Subscription {
    registry: Arc<Registry>,
    entries: Vec<(EventKind, u64)>,
}

impl Subscription {
    /// Remove every registration this handle covers. The callback is never
    /// invoked again, though a delivery already in flight still completes.
    pub fn unsubscribe(self) {
        for (kind, token) in &self.entries {
            self.registry.remove(*kind, *token);
        }
    }
}

/// Routes decoded events to registered subscribers.
pub struct Dispatcher {
    registry: Arc<Registry>,
    queue: mpsc::UnboundedSender<(EventKind, StreamEvent)>,
}

impl Dispatcher {
    /// Create the dispatcher and spawn its delivery worker.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let registry = Arc::new(Registry {
            subscribers: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        });
        let (queue, mut rx) = mpsc::unbounded_channel::<(EventKind, StreamEvent)>();

        let worker_registry = Arc::clone(&registry);
        tokio::spawn(async move {
            while let Some((kind, event)) = rx.recv().await {
                for callback in worker_registry.snapshot(kind) {
                    let event = event.clone();
                    if catch_unwind(AssertUnwindSafe(|| callback(kind, event))).is_err() {
                        warn!(%kind, "subscriber panicked during dispatch");
                    }
                }
            }
        });

        Self { registry, queue }
    }

    /// Register a callback for one event kind by wire name.
    ///
    /// Valid names are the realtime kinds plus the reserved `error` and
    /// `closed`; anything else is a usage error.
    pub fn subscribe(&self, kind: &str, callback: EventCallback) -> Result<Subscription> {
        let kind = EventKind::parse(kind)?;
        Ok(self.subscribe_kind(kind, callback))
    }

    /// Register a callback for one already-parsed event kind.
    pub fn subscribe_kind(&self, kind: EventKind, callback: EventCallback) -> Subscription {
        let token = self.registry.add(kind, callback);
        Subscription {
            registry: Arc::clone(&self.registry),
            entries: vec![(kind, token)],
        }
    }

    /// Register a callback for every realtime kind (not `error`/`closed`).
    /// The returned handle removes all of the registrations at once.
    pub fn subscribe_all(&self, callback: EventCallback) -> Subscription {
        let entries = EventKind::REALTIME
            .iter()
            .map(|kind| (*kind, self.registry.add(*kind, Arc::clone(&callback))))
            .collect();
        Subscription {
            registry: Arc::clone(&self.registry),
            entries,
        }
    }

    /// Queue an event for delivery to the subscribers of `kind`.
    pub fn dispatch(&self, kind: EventKind, event: StreamEvent) {
        // Send only fails when the worker is gone, i.e. at shutdown.
        let _ = self.queue.send((kind, event));
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
