//! Form construction pipeline.
//!
//! [`FormBuilder`] turns a validated [`FormSpec`] into a constructed widget
//! tree by composing the three coordination primitives:
//!
//! ```text
//! FormBuilder (orchestration)
//!   ├─> metadata::validate      (phase 100: structural checks)
//!   ├─> ServiceContainer        (phase 200: resolve widget.<kind> factories)
//!   ├─> WidgetFactory::create   (phase 300: instantiate the tree)
//!   ├─> EventAggregator         (phase 400: await every widget's readiness)
//!   └─> summary assembly        (phase 500: finalize)
//! ```
//!
//! Each phase is one step of an [`InitPipeline`] run over a shared
//! [`ParamBag`]; any phase aborts the whole build with a reason.

use crate::container::ServiceContainer;
use crate::events::{
    CaptureMap, EventAggregator, ObjectId, Observable, SessionHandlers, SessionStatus,
};
use crate::init::{InitPipeline, ParamBag, StepResult};
use crate::metadata::{FormSpec, MetadataError, WidgetKind};
use crate::widget::{
    widget_service_key, SharedWidgetFactory, Widget, WidgetNode, READY_EVENT, SETUP_FAILED_EVENT,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const BAG_SPEC: &str = "spec";
const BAG_FACTORIES: &str = "factories";
const BAG_WIDGETS: &str = "widgets";
const BAG_ID_INDEX: &str = "id_index";
const BAG_CAPTURE: &str = "capture";
const BAG_READY_ORDER: &str = "ready_order";
const BAG_TIMINGS: &str = "timings";

/// Knobs for one build run.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Deadline for the readiness phase; `None` waits indefinitely.
    pub ready_timeout: Option<Duration>,
}

/// Duration of one build phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTiming {
    /// Phase name (step name in the pipeline).
    pub phase: String,
    /// Elapsed milliseconds.
    pub duration_ms: u64,
}

/// Timing summary of a build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildMetrics {
    /// Per-phase durations, in execution order.
    pub phases: Vec<PhaseTiming>,
    /// Wall-clock total for the run.
    pub total_ms: u64,
}

/// Errors surfaced by [`FormBuilder::build`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// Metadata could not be loaded.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A pipeline phase aborted the build.
    #[error("build aborted in phase '{phase}': {reason}")]
    Aborted {
        /// The phase that aborted.
        phase: String,
        /// The reason, unchanged from the phase.
        reason: String,
        /// Optional structured detail.
        detail: Option<JsonValue>,
    },
}

/// A successfully constructed form.
pub struct BuiltForm {
    /// Form identifier from the spec.
    pub form_name: String,
    /// Constructed top-level widgets.
    pub widgets: Vec<Box<dyn Widget>>,
    /// Top-level widget names in readiness order.
    pub ready_order: Vec<String>,
    /// Per-phase timings.
    pub metrics: BuildMetrics,
}

impl std::fmt::Debug for BuiltForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltForm")
            .field("form_name", &self.form_name)
            .field("widgets", &self.describe())
            .field("ready_order", &self.ready_order)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl BuiltForm {
    /// Summaries of the constructed tree.
    pub fn describe(&self) -> Vec<WidgetNode> {
        self.widgets.iter().map(|w| w.describe()).collect()
    }

    /// Serializable build report.
    pub fn report(&self) -> BuildReport {
        BuildReport {
            name: self.form_name.clone(),
            widget_count: self.widgets.len(),
            widgets: self.describe(),
            ready_order: self.ready_order.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Serializable summary of a completed build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Form identifier.
    pub name: String,
    /// Number of top-level widgets.
    pub widget_count: usize,
    /// Widget summaries.
    pub widgets: Vec<WidgetNode>,
    /// Top-level widget names in readiness order.
    pub ready_order: Vec<String>,
    /// Timing summary.
    pub metrics: BuildMetrics,
}

/// Drives metadata through validation, factory resolution, instantiation and
/// readiness aggregation.
pub struct FormBuilder {
    container: Arc<ServiceContainer>,
    options: BuildOptions,
}

impl FormBuilder {
    /// Builder over a composed container.
    pub fn new(container: Arc<ServiceContainer>) -> Self {
        Self {
            container,
            options: BuildOptions::default(),
        }
    }

    /// Override the build options.
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Load a form file and construct its widget tree.
    pub async fn build_file(&self, path: &std::path::Path) -> Result<BuiltForm, BuildError> {
        let spec = FormSpec::from_file(path)?;
        self.build(spec).await
    }

    /// Construct the widget tree described by `spec`.
    pub async fn build(&self, spec: FormSpec) -> Result<BuiltForm, BuildError> {
        let started = Instant::now();
        tracing::info!(form = %spec.name, fields = spec.field_count(), "building form");

        let pipeline = InitPipeline::new()
            .add_fn("validate", 100, |params| async move {
                timed(params, "validate", validate_phase)
            })
            .add_fn("resolve", 200, {
                let container = Arc::clone(&self.container);
                move |params| {
                    let container = Arc::clone(&container);
                    async move { timed(params, "resolve", |p| resolve_phase(p, &container)) }
                }
            })
            .add_fn("instantiate", 300, {
                let container = Arc::clone(&self.container);
                move |params| {
                    let container = Arc::clone(&container);
                    async move { timed(params, "instantiate", |p| instantiate_phase(p, &container)) }
                }
            })
            .add_fn("activate", 400, {
                let timeout = self.options.ready_timeout;
                move |params| async move {
                    let phase_started = Instant::now();
                    let result = activate_phase(params, timeout).await;
                    record_timing(result, "activate", phase_started)
                }
            })
            .add_fn("finalize", 500, |params| async move {
                timed(params, "finalize", finalize_phase)
            });

        let bag = ParamBag::new()
            .with(BAG_SPEC, spec)
            .with(BAG_TIMINGS, Vec::<PhaseTiming>::new());

        let mut bag = pipeline.run(bag).await.map_err(|abort| BuildError::Aborted {
            phase: abort.step,
            reason: abort.reason,
            detail: abort.detail,
        })?;

        let form_name = bag
            .take::<FormSpec>(BAG_SPEC)
            .map(|s| s.name)
            .unwrap_or_default();
        let widgets = bag.take::<Vec<Box<dyn Widget>>>(BAG_WIDGETS).unwrap_or_default();
        let ready_order = bag.take::<Vec<String>>(BAG_READY_ORDER).unwrap_or_default();
        let metrics = BuildMetrics {
            phases: bag.take::<Vec<PhaseTiming>>(BAG_TIMINGS).unwrap_or_default(),
            total_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            form = %form_name,
            widgets = widgets.len(),
            total_ms = metrics.total_ms,
            "form built"
        );

        Ok(BuiltForm {
            form_name,
            widgets,
            ready_order,
            metrics,
        })
    }
}

/// Run a synchronous phase body and record its duration on success.
fn timed(
    params: ParamBag,
    phase: &str,
    body: impl FnOnce(ParamBag) -> StepResult,
) -> StepResult {
    let started = Instant::now();
    record_timing(body(params), phase, started)
}

fn record_timing(result: StepResult, phase: &str, started: Instant) -> StepResult {
    match result {
        StepResult::Continue(mut params) => {
            if let Some(timings) = params.get_mut::<Vec<PhaseTiming>>(BAG_TIMINGS) {
                timings.push(PhaseTiming {
                    phase: phase.to_string(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
            StepResult::Continue(params)
        }
        abort => abort,
    }
}

fn validate_phase(params: ParamBag) -> StepResult {
    let Some(spec) = params.get::<FormSpec>(BAG_SPEC) else {
        return StepResult::abort("no form spec in parameter bag");
    };

    let issues = spec.validate();
    if issues.is_empty() {
        tracing::debug!(form = %spec.name, "metadata validated");
        StepResult::advance(params)
    } else {
        let detail: Vec<JsonValue> = issues
            .iter()
            .map(|i| serde_json::json!({ "path": i.path, "message": i.message }))
            .collect();
        StepResult::abort_with(
            format!("metadata validation failed with {} issue(s)", issues.len()),
            JsonValue::Array(detail),
        )
    }
}

fn resolve_phase(mut params: ParamBag, container: &ServiceContainer) -> StepResult {
    let Some(spec) = params.get::<FormSpec>(BAG_SPEC) else {
        return StepResult::abort("no form spec in parameter bag");
    };

    let mut factories: HashMap<WidgetKind, SharedWidgetFactory> = HashMap::new();
    for kind in spec.used_kinds() {
        let key = widget_service_key(kind);
        match container.get_cloned::<SharedWidgetFactory>(&key) {
            Ok(factory) => {
                factories.insert(kind, factory);
            }
            Err(err) => return StepResult::abort(err.to_string()),
        }
    }

    tracing::debug!(kinds = factories.len(), "widget factories resolved");
    params.insert(BAG_FACTORIES, factories);
    StepResult::advance(params)
}

fn instantiate_phase(mut params: ParamBag, container: &ServiceContainer) -> StepResult {
    let Some(spec) = params.get::<FormSpec>(BAG_SPEC) else {
        return StepResult::abort("no form spec in parameter bag");
    };
    let Some(factories) = params.get::<HashMap<WidgetKind, SharedWidgetFactory>>(BAG_FACTORIES)
    else {
        return StepResult::abort("factories not resolved");
    };

    let mut widgets: Vec<Box<dyn Widget>> = Vec::with_capacity(spec.fields.len());
    let mut id_index: HashMap<ObjectId, String> = HashMap::new();

    for field in &spec.fields {
        let Some(factory) = factories.get(&field.kind) else {
            return StepResult::abort(format!("no factory resolved for kind '{}'", field.kind));
        };
        match factory.create(field, container) {
            Ok(widget) => {
                if let Some(observable) = widget.observable() {
                    id_index.insert(observable.object_id(), field.name.clone());
                }
                widgets.push(widget);
            }
            Err(err) => {
                return StepResult::abort(format!(
                    "failed to instantiate field '{}': {err}",
                    field.name
                ));
            }
        }
    }

    tracing::debug!(widgets = widgets.len(), "widget tree instantiated");
    params.insert(BAG_WIDGETS, widgets);
    params.insert(BAG_ID_INDEX, id_index);
    StepResult::advance(params)
}

async fn activate_phase(mut params: ParamBag, timeout: Option<Duration>) -> StepResult {
    let Some(widgets) = params.get::<Vec<Box<dyn Widget>>>(BAG_WIDGETS) else {
        return StepResult::abort("no widgets instantiated");
    };

    let aggregator = EventAggregator::new();
    let (tx, rx) = tokio::sync::oneshot::channel::<Result<CaptureMap, JsonValue>>();
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
            let _ = tx.send(Err(event.payload));
        }
    })
    .with_veto(|event| event.name != SETUP_FAILED_EVENT);

    let observables = widgets.iter().map(|w| w.observable());
    if let Err(err) =
        aggregator.register_objects(observables, &[READY_EVENT, SETUP_FAILED_EVENT], handlers)
    {
        return StepResult::abort(err.to_string());
    }
    debug_assert_ne!(aggregator.status(), SessionStatus::Idle);

    for widget in widgets {
        widget.start();
    }

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, rx).await {
            Ok(received) => received,
            Err(_) => {
                // Release every pending subscription before aborting.
                aggregator.reset();
                return StepResult::abort(format!(
                    "widgets not ready within {}ms",
                    limit.as_millis()
                ));
            }
        },
        None => rx.await,
    };

    match outcome {
        Ok(Ok(captured)) => {
            params.insert(BAG_CAPTURE, captured);
            StepResult::advance(params)
        }
        Ok(Err(payload)) => {
            StepResult::abort_with("widget setup failed", payload)
        }
        Err(_) => StepResult::abort("readiness channel closed unexpectedly"),
    }
}

fn finalize_phase(mut params: ParamBag) -> StepResult {
    let captured = params.take::<CaptureMap>(BAG_CAPTURE).unwrap_or_default();
    let id_index = params
        .take::<HashMap<ObjectId, String>>(BAG_ID_INDEX)
        .unwrap_or_default();

    let ready_order: Vec<String> = captured
        .get(READY_EVENT)
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id_index.get(id).cloned())
                .collect()
        })
        .unwrap_or_default();

    params.insert(BAG_READY_ORDER, ready_order);
    StepResult::advance(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ChoiceSpec, FieldSpec};
    use crate::widget::{
        GroupWidgetFactory, InputWidgetFactory, SelectWidgetFactory,
    };
    use serde_json::json;

    fn composed_container() -> Arc<ServiceContainer> {
        let container = ServiceContainer::new();
        for kind in [
            WidgetKind::Text,
            WidgetKind::Number,
            WidgetKind::Checkbox,
            WidgetKind::Date,
        ] {
            container.set_value::<SharedWidgetFactory>(
                widget_service_key(kind),
                Arc::new(InputWidgetFactory),
            );
        }
        container.set_value::<SharedWidgetFactory>(
            widget_service_key(WidgetKind::Select),
            Arc::new(SelectWidgetFactory),
        );
        container.set_value::<SharedWidgetFactory>(
            widget_service_key(WidgetKind::Group),
            Arc::new(GroupWidgetFactory),
        );
        Arc::new(container)
    }

    fn login_spec() -> FormSpec {
        FormSpec {
            name: "login".to_string(),
            title: Some("Sign in".to_string()),
            description: None,
            fields: vec![
                FieldSpec::new("username", WidgetKind::Text),
                FieldSpec::new("remember", WidgetKind::Checkbox),
                FieldSpec {
                    options: vec![
                        ChoiceSpec { value: json!("en"), label: None },
                        ChoiceSpec { value: json!("de"), label: None },
                    ],
                    ..FieldSpec::new("locale", WidgetKind::Select)
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_build_captures_every_widget() {
        let builder = FormBuilder::new(composed_container());
        let built = builder.build(login_spec()).await.unwrap();

        assert_eq!(built.form_name, "login");
        assert_eq!(built.widgets.len(), 3);
        assert_eq!(built.ready_order.len(), 3);
        assert!(built.ready_order.contains(&"username".to_string()));

        let phases: Vec<&str> = built.metrics.phases.iter().map(|p| p.phase.as_str()).collect();
        assert_eq!(
            phases,
            vec!["validate", "resolve", "instantiate", "activate", "finalize"]
        );
    }

    #[tokio::test]
    async fn test_invalid_metadata_aborts_in_validate() {
        let builder = FormBuilder::new(composed_container());
        let spec = FormSpec {
            name: String::new(),
            title: None,
            description: None,
            fields: vec![],
        };

        let err = builder.build(spec).await.unwrap_err();
        match err {
            BuildError::Aborted { phase, detail, .. } => {
                assert_eq!(phase, "validate");
                assert!(detail.is_some());
            }
            other => panic!("expected abort, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_unregistered_kind_aborts_in_resolve() {
        // Container with no select factory.
        let container = ServiceContainer::new();
        container.set_value::<SharedWidgetFactory>(
            widget_service_key(WidgetKind::Text),
            Arc::new(InputWidgetFactory),
        );
        let builder = FormBuilder::new(Arc::new(container));

        let err = builder.build(login_spec()).await.unwrap_err();
        match err {
            BuildError::Aborted { phase, reason, .. } => {
                assert_eq!(phase, "resolve");
                assert!(reason.contains("widget.checkbox") || reason.contains("widget.select"));
            }
            other => panic!("expected abort, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_failing_widget_aborts_in_activate() {
        let builder = FormBuilder::new(composed_container());
        let mut spec = login_spec();
        spec.fields.push(FieldSpec {
            default: Some(json!("not a number")),
            ..FieldSpec::new("age", WidgetKind::Number)
        });

        let err = builder.build(spec).await.unwrap_err();
        match err {
            BuildError::Aborted { phase, detail, .. } => {
                assert_eq!(phase, "activate");
                assert_eq!(detail.unwrap()["field"], json!("age"));
            }
            other => panic!("expected abort, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_nested_group_builds_and_reports_ready() {
        let builder = FormBuilder::new(composed_container());
        let spec = FormSpec {
            name: "profile".to_string(),
            title: None,
            description: None,
            fields: vec![FieldSpec {
                children: vec![
                    FieldSpec::new("street", WidgetKind::Text),
                    FieldSpec::new("city", WidgetKind::Text),
                ],
                ..FieldSpec::new("address", WidgetKind::Group)
            }],
        };

        let built = builder.build(spec).await.unwrap();
        assert_eq!(built.ready_order, vec!["address".to_string()]);
        assert_eq!(built.widgets[0].children().len(), 2);
    }

    #[tokio::test]
    async fn test_build_file_surfaces_metadata_errors() {
        let builder = FormBuilder::new(composed_container());
        let err = builder
            .build_file(std::path::Path::new("/missing/form.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Metadata(_)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("form.yaml");
        std::fs::write(&path, "name: filed\nfields:\n  - name: a\n    kind: text\n").unwrap();
        let built = builder.build_file(&path).await.unwrap();
        assert_eq!(built.form_name, "filed");
    }

    #[tokio::test]
    async fn test_options_src_select_builds_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("choices.json");
        std::fs::write(&path, r#"[{"value":1},{"value":2},{"value":3}]"#).unwrap();

        let builder = FormBuilder::new(composed_container());
        let spec = FormSpec {
            name: "async_form".to_string(),
            title: None,
            description: None,
            fields: vec![
                FieldSpec::new("label", WidgetKind::Text),
                FieldSpec {
                    options_src: Some(path.display().to_string()),
                    ..FieldSpec::new("pick", WidgetKind::Select)
                },
            ],
        };

        let built = builder.build(spec).await.unwrap();
        // The async select reports after the sync text widget.
        assert_eq!(built.ready_order.last().unwrap(), "pick");
        let nodes = built.describe();
        assert_eq!(nodes[1].option_count, Some(3));
    }

    #[tokio::test]
    async fn test_ready_timeout_aborts_activate() {
        // A widget that never reports ready.
        struct StalledWidget {
            emitter: crate::events::Emitter,
        }
        impl Widget for StalledWidget {
            fn name(&self) -> &str {
                "stalled"
            }
            fn kind(&self) -> WidgetKind {
                WidgetKind::Text
            }
            fn observable(&self) -> Option<crate::events::SharedObservable> {
                Some(Arc::new(self.emitter.clone()))
            }
            fn start(&self) {
                // Never fires ready.
            }
            fn describe(&self) -> WidgetNode {
                WidgetNode {
                    name: "stalled".to_string(),
                    kind: WidgetKind::Text,
                    label: "stalled".to_string(),
                    required: false,
                    option_count: None,
                    children: Vec::new(),
                }
            }
        }
        struct StalledFactory;
        impl crate::widget::WidgetFactory for StalledFactory {
            fn create(
                &self,
                _spec: &FieldSpec,
                _container: &ServiceContainer,
            ) -> Result<Box<dyn Widget>, crate::widget::WidgetError> {
                Ok(Box::new(StalledWidget {
                    emitter: crate::events::Emitter::new(),
                }))
            }
        }

        let container = composed_container();
        container.set_value::<SharedWidgetFactory>(
            widget_service_key(WidgetKind::Text),
            Arc::new(StalledFactory),
        );

        let spec = FormSpec {
            name: "stalling".to_string(),
            title: None,
            description: None,
            fields: vec![FieldSpec::new("never", WidgetKind::Text)],
        };

        let err = FormBuilder::new(container)
            .with_options(BuildOptions {
                ready_timeout: Some(Duration::from_millis(50)),
            })
            .build(spec)
            .await
            .unwrap_err();

        match err {
            BuildError::Aborted { phase, reason, .. } => {
                assert_eq!(phase, "activate");
                assert!(reason.contains("not ready within"));
            }
            other => panic!("expected abort, got {other}"),
        }
    }
}
