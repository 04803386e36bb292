//! Multi-object event aggregation.
//!
//! An [`EventAggregator`] waits for a dynamic set of heterogeneous objects to
//! each fire one of a set of designated one-shot events exactly once, then
//! invokes a single success continuation — while allowing early abort through
//! a veto handler or [`EventAggregator::reset`].
//!
//! # Session lifecycle
//!
//! ```text
//! Idle ──register_objects──▶ Collecting ──all reported──▶ Completed
//!                                │
//!                                └──veto / reset──▶ Aborted / Idle
//! ```
//!
//! An object is *done* after its first qualifying event: its remaining
//! pending subscriptions are released immediately, even if other designated
//! events could still fire. The session is complete exactly when no tracked
//! objects remain; the success continuation runs exactly once, with the
//! capture map (event name → object identities in firing order).
//!
//! Cancellation (`reset`, veto-abort) synchronously releases every pending
//! subscription — a released subscription never fires into a torn-down
//! session.

use super::emitter::{Event, ObjectId, Observable, SharedObservable, SubscriptionId, Trackable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Capture map: event name → objects that reported it, in firing order.
pub type CaptureMap = HashMap<String, Vec<ObjectId>>;

/// Success continuation, invoked with the capture map.
pub type SuccessFn = Box<dyn FnOnce(CaptureMap) + Send>;

/// Failure continuation, invoked with the vetoed event.
pub type FailureFn = Box<dyn FnOnce(Event) + Send>;

/// Veto handler: returns `false` to reject the captured event and abort.
pub type VetoFn = Box<dyn FnMut(&Event) -> bool + Send>;

/// Continuations for one aggregation session.
///
/// `on_failure` is optional, but callers that rely on failure semantics must
/// supply it: without one, a veto-abort degrades to invoking `on_success` as
/// the completion signal (legacy behavior, logged as a warning).
pub struct SessionHandlers {
    on_success: SuccessFn,
    on_failure: Option<FailureFn>,
    veto: Option<VetoFn>,
}

impl SessionHandlers {
    /// Session with only a success continuation.
    pub fn new(on_success: impl FnOnce(CaptureMap) + Send + 'static) -> Self {
        Self {
            on_success: Box::new(on_success),
            on_failure: None,
            veto: None,
        }
    }

    /// Attach a failure continuation for the veto-abort path.
    pub fn with_failure(mut self, on_failure: impl FnOnce(Event) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(on_failure));
        self
    }

    /// Attach a veto handler consulted on every captured event.
    pub fn with_veto(mut self, veto: impl FnMut(&Event) -> bool + Send + 'static) -> Self {
        self.veto = Some(Box::new(veto));
        self
    }
}

/// Errors surfaced by aggregation sessions.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// A veto handler rejected a captured event and aborted the session.
    #[error("aggregation vetoed on event '{event}' from {source_id}")]
    Vetoed {
        /// Name of the rejected event.
        event: String,
        /// Identity of the object that fired it.
        source_id: ObjectId,
    },

    /// The optional deadline elapsed before every object reported.
    #[error("aggregation timed out after {0:?}")]
    Timeout(Duration),

    /// `register_objects` was called while a session was already collecting.
    #[error("aggregation session already collecting; reset first or use add_objects")]
    AlreadyCollecting,

    /// The session was torn down before reaching a terminal state.
    #[error("aggregation session dropped before completion")]
    Incomplete,
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session in progress.
    Idle,
    /// Tracked objects have pending subscriptions.
    Collecting,
    /// Every tracked object reported; success continuation ran.
    Completed,
    /// A veto rejected an event; failure path ran.
    Aborted,
}

struct Registration {
    object: SharedObservable,
    handles: HashMap<String, SubscriptionId>,
}

struct SessionState {
    status: SessionStatus,
    // Bumped on reset; listeners from an older epoch are no-ops.
    epoch: u64,
    registry: HashMap<ObjectId, Registration>,
    captured: CaptureMap,
    on_success: Option<SuccessFn>,
    on_failure: Option<FailureFn>,
    veto: Option<Arc<Mutex<VetoFn>>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            epoch: 0,
            registry: HashMap::new(),
            captured: CaptureMap::new(),
            on_success: None,
            on_failure: None,
            veto: None,
        }
    }

    fn drain_registry(&mut self) -> Vec<Registration> {
        self.registry.drain().map(|(_, reg)| reg).collect()
    }
}

fn release_all(registrations: Vec<Registration>) {
    for reg in registrations {
        for (_, sub_id) in reg.handles {
            reg.object.unsubscribe(sub_id);
        }
    }
}

/// Coordinator for one-shot event aggregation sessions.
///
/// Continuations and veto handlers are invoked with no internal lock held, so
/// they may re-enter the aggregator (reset, start a new session).
pub struct EventAggregator {
    state: Arc<Mutex<SessionState>>,
}

impl EventAggregator {
    /// Create an aggregator in the `Idle` state.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
        }
    }

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    /// Number of objects still being waited on.
    pub fn tracked_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Begin a session: track every observable in `objects` for each name in
    /// `event_names`.
    ///
    /// Items without the [`Observable`] capability are silently skipped, as
    /// are objects already tracked. Returns the number of newly tracked
    /// objects. If nothing ends up tracked, the session completes immediately
    /// with an empty capture map.
    ///
    /// Fails with [`AggregationError::AlreadyCollecting`] if a session is in
    /// progress; a terminal (`Completed`/`Aborted`) session is implicitly
    /// reset.
    pub fn register_objects<I, T>(
        &self,
        objects: I,
        event_names: &[&str],
        handlers: SessionHandlers,
    ) -> Result<usize, AggregationError>
    where
        I: IntoIterator<Item = T>,
        T: Trackable,
    {
        {
            let mut state = self.state.lock();
            match state.status {
                SessionStatus::Collecting => return Err(AggregationError::AlreadyCollecting),
                SessionStatus::Completed | SessionStatus::Aborted => {
                    // Terminal sessions hold no subscriptions; clear in place.
                    state.epoch += 1;
                    state.registry.clear();
                    state.captured.clear();
                }
                SessionStatus::Idle => {}
            }
            state.status = SessionStatus::Collecting;
            state.on_success = Some(handlers.on_success);
            state.on_failure = handlers.on_failure;
            state.veto = handlers.veto.map(|v| Arc::new(Mutex::new(v)));
        }

        let tracked = self.track(objects, event_names);
        self.complete_if_drained();
        Ok(tracked)
    }

    /// Grow the tracked set of an in-progress session.
    ///
    /// Returns the number of newly tracked objects; 0 when the session is not
    /// collecting.
    pub fn add_objects<I, T>(&self, objects: I, event_names: &[&str]) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Trackable,
    {
        if self.state.lock().status != SessionStatus::Collecting {
            return 0;
        }
        self.track(objects, event_names)
    }

    /// Abort any in-flight session and return to `Idle`.
    ///
    /// Synchronously releases every pending subscription; no continuation is
    /// invoked. Callable from any state.
    pub fn reset(&self) {
        let to_release = {
            let mut state = self.state.lock();
            state.epoch += 1;
            state.status = SessionStatus::Idle;
            state.captured.clear();
            state.on_success = None;
            state.on_failure = None;
            state.veto = None;
            state.drain_registry()
        };
        release_all(to_release);
    }

    fn track<I, T>(&self, objects: I, event_names: &[&str]) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Trackable,
    {
        let mut tracked = 0;

        for candidate in objects {
            let Some(object) = candidate.as_observable() else {
                tracing::debug!("skipping non-observable aggregation candidate");
                continue;
            };
            let object_id = object.object_id();

            let epoch = {
                let mut state = self.state.lock();
                if state.status != SessionStatus::Collecting
                    || state.registry.contains_key(&object_id)
                {
                    continue;
                }
                state.registry.insert(
                    object_id,
                    Registration {
                        object: Arc::clone(&object),
                        handles: HashMap::new(),
                    },
                );
                state.epoch
            };
            tracked += 1;

            for name in event_names {
                let state_arc = Arc::clone(&self.state);
                let listener_name = (*name).to_string();
                let sub_id = object.subscribe_once(
                    name,
                    Box::new(move |event| {
                        handle_report(&state_arc, epoch, event);
                    }),
                );

                // Record the handle, unless the object already reported (its
                // entry is gone) or the session was torn down meanwhile.
                let stale = {
                    let mut state = self.state.lock();
                    if state.epoch != epoch {
                        true
                    } else if let Some(reg) = state.registry.get_mut(&object_id) {
                        reg.handles.insert(listener_name, sub_id);
                        false
                    } else {
                        true
                    }
                };
                if stale {
                    object.unsubscribe(sub_id);
                    break;
                }
            }
        }

        tracked
    }

    /// Complete the session if registration left nothing to wait on.
    fn complete_if_drained(&self) {
        let completion = {
            let mut state = self.state.lock();
            if state.status == SessionStatus::Collecting && state.registry.is_empty() {
                state.status = SessionStatus::Completed;
                state
                    .on_success
                    .take()
                    .map(|f| (f, std::mem::take(&mut state.captured)))
            } else {
                None
            }
        };
        if let Some((on_success, captured)) = completion {
            on_success(captured);
        }
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// One tracked object reported. Runs as the one-shot listener body.
fn handle_report(state_arc: &Arc<Mutex<SessionState>>, epoch: u64, event: &Event) {
    // Phase 1: consume the registration entry and capture the report.
    let (released, veto) = {
        let mut state = state_arc.lock();
        if state.epoch != epoch || state.status != SessionStatus::Collecting {
            return;
        }
        let Some(reg) = state.registry.remove(&event.source) else {
            return;
        };
        state
            .captured
            .entry(event.name.clone())
            .or_default()
            .push(event.source);
        let veto = state.veto.as_ref().map(Arc::clone);
        (reg, veto)
    };

    // One-shot semantics: the object is done after its first report; release
    // its other pending subscriptions before anything else runs.
    release_all(vec![released]);

    let allowed = match veto {
        Some(veto) => {
            let mut guard = veto.lock();
            (*guard)(event)
        }
        None => true,
    };

    if !allowed {
        abort_session(state_arc, epoch, event);
        return;
    }

    // Phase 2: complete if this was the last tracked object.
    let completion = {
        let mut state = state_arc.lock();
        if state.epoch != epoch || state.status != SessionStatus::Collecting {
            return;
        }
        if state.registry.is_empty() {
            state.status = SessionStatus::Completed;
            state
                .on_success
                .take()
                .map(|f| (f, std::mem::take(&mut state.captured)))
        } else {
            None
        }
    };

    if let Some((on_success, captured)) = completion {
        on_success(captured);
    }
}

enum AbortContinuation {
    Failure(FailureFn),
    DegradedSuccess(SuccessFn, CaptureMap),
    None,
}

fn abort_session(state_arc: &Arc<Mutex<SessionState>>, epoch: u64, event: &Event) {
    let (to_release, continuation) = {
        let mut state = state_arc.lock();
        // The veto handler may have reset or restarted the session.
        if state.epoch != epoch || state.status != SessionStatus::Collecting {
            return;
        }
        state.status = SessionStatus::Aborted;
        state.veto = None;
        let to_release = state.drain_registry();

        let continuation = if let Some(on_failure) = state.on_failure.take() {
            state.on_success = None;
            AbortContinuation::Failure(on_failure)
        } else if let Some(on_success) = state.on_success.take() {
            tracing::warn!(
                event = %event.name,
                source = %event.source,
                "aggregation vetoed with no failure handler; degrading to success continuation"
            );
            AbortContinuation::DegradedSuccess(on_success, std::mem::take(&mut state.captured))
        } else {
            AbortContinuation::None
        };
        (to_release, continuation)
    };

    release_all(to_release);

    match continuation {
        AbortContinuation::Failure(on_failure) => on_failure(event.clone()),
        AbortContinuation::DegradedSuccess(on_success, captured) => on_success(captured),
        AbortContinuation::None => {}
    }
}

/// Await a full set of reports, with an optional deadline.
///
/// Convenience wrapper over the callback API: builds a one-off session over
/// `objects`, resolves with the capture map once every object has reported,
/// or fails on veto or timeout. `timeout: None` waits indefinitely, matching
/// the callback API.
pub async fn wait_all<I, T>(
    objects: I,
    event_names: &[&str],
    timeout: Option<Duration>,
) -> Result<CaptureMap, AggregationError>
where
    I: IntoIterator<Item = T>,
    T: Trackable,
{
    let aggregator = EventAggregator::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let tx_ok = Arc::clone(&tx);
    let tx_err = Arc::clone(&tx);
    let handlers = SessionHandlers::new(move |captured| {
        if let Some(tx) = tx_ok.lock().take() {
            let _ = tx.send(Ok(captured));
        }
    })
    .with_failure(move |event| {
        if let Some(tx) = tx_err.lock().take() {
            let _ = tx.send(Err(AggregationError::Vetoed {
                event: event.name,
                source_id: event.source,
            }));
        }
    });

    aggregator.register_objects(objects, event_names, handlers)?;

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, rx).await {
            Ok(received) => received,
            Err(_) => {
                // Release every pending subscription before reporting.
                aggregator.reset();
                return Err(AggregationError::Timeout(limit));
            }
        },
        None => rx.await,
    };

    outcome.unwrap_or(Err(AggregationError::Incomplete))
}
