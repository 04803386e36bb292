//! One-shot event sources.
//!
//! An [`Emitter`] is the canonical implementation of the [`Observable`]
//! capability: callers subscribe a listener to a named event and receive a
//! [`SubscriptionId`] handle; the listener fires at most once and is released
//! automatically on delivery. Emitters are cheap to clone — clones share the
//! same subscription table and identity.

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Identity of an event source.
///
/// Two clones of the same [`Emitter`] share one `ObjectId`; the aggregator
/// keys its registration entries on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a fresh identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for a pending one-shot subscription, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A fired event as delivered to listeners.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name, e.g. `"ready"`.
    pub name: String,
    /// Identity of the source that fired the event.
    pub source: ObjectId,
    /// Arbitrary payload supplied at emission time.
    pub payload: JsonValue,
}

/// Listener invoked at most once, then released.
pub type OnceListener = Box<dyn FnOnce(&Event) + Send>;

/// Capability interface for objects the aggregator can track.
///
/// Replaces runtime type probing with an explicit contract: subscribe a
/// one-shot listener to a named event, get back a cancellable handle.
pub trait Observable: Send + Sync {
    /// Stable identity of this event source.
    fn object_id(&self) -> ObjectId;

    /// Register a listener fired at most once for `event_name`.
    fn subscribe_once(&self, event_name: &str, listener: OnceListener) -> SubscriptionId;

    /// Cancel a pending subscription. Returns `true` iff a subscription was
    /// actually removed (i.e. it had not yet fired or been cancelled).
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Shared handle to any observable object.
pub type SharedObservable = Arc<dyn Observable>;

struct PendingSubscription {
    id: SubscriptionId,
    listener: OnceListener,
}

#[derive(Default)]
struct EmitterState {
    subscriptions: HashMap<String, Vec<PendingSubscription>>,
}

/// A cloneable one-shot event source.
///
/// Delivery is synchronous: [`Emitter::emit`] invokes every pending listener
/// for the event name on the calling thread. Listeners are released *before*
/// they run, so a listener that re-subscribes during delivery is not invoked
/// again for the same emission.
#[derive(Clone)]
pub struct Emitter {
    id: ObjectId,
    state: Arc<Mutex<EmitterState>>,
}

impl Emitter {
    /// Create a new event source with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: ObjectId::new(),
            state: Arc::new(Mutex::new(EmitterState::default())),
        }
    }

    /// Identity of this source.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Number of pending subscriptions across all event names.
    pub fn pending_subscriptions(&self) -> usize {
        self.state.lock().subscriptions.values().map(Vec::len).sum()
    }

    /// Fire `event_name`, consuming every pending listener registered for it.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event_name: &str, payload: JsonValue) -> usize {
        // Drain under the lock, invoke after releasing it: listeners may call
        // back into this emitter (unsubscribe, re-subscribe).
        let due = {
            let mut state = self.state.lock();
            state.subscriptions.remove(event_name).unwrap_or_default()
        };

        if due.is_empty() {
            tracing::trace!(source = %self.id, event = event_name, "emit with no listeners");
            return 0;
        }

        let event = Event {
            name: event_name.to_string(),
            source: self.id,
            payload,
        };

        let count = due.len();
        for pending in due {
            (pending.listener)(&event);
        }
        count
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("id", &self.id)
            .field("pending", &self.pending_subscriptions())
            .finish()
    }
}

impl Observable for Emitter {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn subscribe_once(&self, event_name: &str, listener: OnceListener) -> SubscriptionId {
        let id = SubscriptionId::next();
        let mut state = self.state.lock();
        state
            .subscriptions
            .entry(event_name.to_string())
            .or_default()
            .push(PendingSubscription { id, listener });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        for subs in state.subscriptions.values_mut() {
            if let Some(pos) = subs.iter().position(|p| p.id == id) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }
}

/// Candidate for aggregation tracking.
///
/// The aggregator accepts anything convertible to a track candidate; items
/// without the [`Observable`] capability yield `None` and are silently
/// skipped during registration.
pub trait Trackable {
    /// The observable view of this object, if it has one.
    fn as_observable(&self) -> Option<SharedObservable>;
}

impl Trackable for Emitter {
    fn as_observable(&self) -> Option<SharedObservable> {
        Some(Arc::new(self.clone()))
    }
}

impl Trackable for SharedObservable {
    fn as_observable(&self) -> Option<SharedObservable> {
        Some(Arc::clone(self))
    }
}

impl<T: Trackable> Trackable for &T {
    fn as_observable(&self) -> Option<SharedObservable> {
        (*self).as_observable()
    }
}

impl<T: Trackable> Trackable for Option<T> {
    fn as_observable(&self) -> Option<SharedObservable> {
        self.as_ref().and_then(Trackable::as_observable)
    }
}
