//! Event primitives for coordinated construction.
//!
//! Two pieces:
//!
//! - [`Emitter`] / [`Observable`]: one-shot event subscriptions with
//!   cancellable handles.
//! - [`EventAggregator`]: waits for a dynamic set of observables to each
//!   report once, then resumes a continuation — with veto-abort and reset.
//!
//! ```rust
//! use armature_core::events::{Emitter, EventAggregator, SessionHandlers};
//!
//! let aggregator = EventAggregator::new();
//! let (a, b) = (Emitter::new(), Emitter::new());
//!
//! aggregator.register_objects(
//!     [&a, &b],
//!     &["ready"],
//!     SessionHandlers::new(|captured| {
//!         assert_eq!(captured["ready"].len(), 2);
//!     }),
//! ).unwrap();
//!
//! a.emit("ready", serde_json::Value::Null);
//! b.emit("ready", serde_json::Value::Null); // continuation runs here
//! ```

pub mod aggregator;
pub mod emitter;

pub use aggregator::{
    wait_all, AggregationError, CaptureMap, EventAggregator, FailureFn, SessionHandlers,
    SessionStatus, SuccessFn, VetoFn,
};
pub use emitter::{
    Emitter, Event, ObjectId, Observable, OnceListener, SharedObservable, SubscriptionId,
    Trackable,
};
