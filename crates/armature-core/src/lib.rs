//! Coordination engine for metadata-driven component construction.
//!
//! Armature builds component trees from declarative metadata. Three
//! primitives carry the coordination load:
//!
//! - [`container::ServiceContainer`] — named service registry with shared and
//!   transient lifetimes; the seam between metadata kinds and widget
//!   factories.
//! - [`events::EventAggregator`] — one-shot event aggregation over a dynamic
//!   object set, with veto-abort and reset.
//! - [`init::InitPipeline`] — priority-ordered, abortable async
//!   initialization steps over a shared parameter bag.
//!
//! [`builder::FormBuilder`] composes them: validate metadata, resolve
//! factories, instantiate widgets, aggregate readiness, finalize.
//!
//! ```rust,no_run
//! use armature_core::builder::FormBuilder;
//! use armature_core::container::ServiceContainer;
//! use armature_core::metadata::FormSpec;
//! use std::sync::Arc;
//!
//! # async fn build() -> Result<(), Box<dyn std::error::Error>> {
//! let container = Arc::new(ServiceContainer::new());
//! // ... register widget.<kind> factories ...
//! let spec = FormSpec::from_file(std::path::Path::new("login.yaml"))?;
//! let built = FormBuilder::new(container).build(spec).await?;
//! println!("{} widgets ready", built.widgets.len());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod container;
pub mod events;
pub mod init;
pub mod metadata;
pub mod widget;

pub use builder::{
    BuildError, BuildMetrics, BuildOptions, BuildReport, BuiltForm, FormBuilder, PhaseTiming,
};
pub use container::{
    ConstructionError, ServiceContainer, ServiceDefinition, ServiceError, ServiceInstance,
};
pub use events::{
    wait_all, AggregationError, CaptureMap, Emitter, Event, EventAggregator, ObjectId, Observable,
    SessionHandlers, SessionStatus, SharedObservable, SubscriptionId, Trackable,
};
pub use init::{FnStep, InitAbort, InitPipeline, ParamBag, RunStatus, StepHandler, StepResult};
pub use metadata::{
    ChoiceSpec, FieldSpec, FormSpec, MetadataError, ValidationIssue, WidgetKind,
};
pub use widget::{
    widget_service_key, GroupWidget, GroupWidgetFactory, InputWidget, InputWidgetFactory,
    SelectWidget, SelectWidgetFactory, SharedWidgetFactory, Widget, WidgetError, WidgetFactory,
    WidgetNode, READY_EVENT, SETUP_FAILED_EVENT,
};
