//! Widget abstraction and the built-in widget set.
//!
//! Widgets here are headless construction artifacts: each one owns an
//! [`Emitter`] and reports `ready` exactly once when its (possibly
//! asynchronous) setup completes, or `setup_failed` with an error payload.
//! Construction code aggregates those readiness events instead of polling.
//!
//! Factories implement [`WidgetFactory`] and are resolved from a
//! [`ServiceContainer`] under `widget.<kind>` service names — the composition
//! root decides which implementation backs each metadata kind.

use crate::container::{ServiceContainer, ServiceError};
use crate::events::{Emitter, EventAggregator, SessionHandlers, SharedObservable};
use crate::metadata::{ChoiceSpec, FieldSpec, WidgetKind};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Event fired when a widget finishes setup.
pub const READY_EVENT: &str = "ready";

/// Event fired when a widget's setup fails; payload carries the error.
pub const SETUP_FAILED_EVENT: &str = "setup_failed";

/// Container service name for a kind's factory, e.g. `widget.select`.
pub fn widget_service_key(kind: WidgetKind) -> String {
    format!("widget.{kind}")
}

/// Errors surfaced by widget factories.
#[derive(Debug, Error)]
pub enum WidgetError {
    /// A collaborator could not be resolved from the container.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// An options source file could not be read.
    #[error("failed to read options source '{path}'")]
    OptionsLoad {
        /// The offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An options source file did not hold a JSON array of choices.
    #[error("invalid options source '{path}': {source}")]
    OptionsParse {
        /// The offending path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Serializable summary of a constructed widget tree.
#[derive(Debug, Clone, Serialize)]
pub struct WidgetNode {
    /// Field name.
    pub name: String,
    /// Widget kind.
    pub kind: WidgetKind,
    /// Display label.
    pub label: String,
    /// Whether the field is required.
    pub required: bool,
    /// Number of resolved options, for choice kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_count: Option<usize>,
    /// Child summaries, for container kinds.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<WidgetNode>,
}

/// A constructed component.
///
/// `start` begins setup; completion is reported through the widget's
/// observable (`ready` / `setup_failed`), never through a return value.
/// Callers must subscribe (directly or via aggregation) *before* calling
/// `start` — simple widgets report synchronously.
pub trait Widget: Send + Sync {
    /// Field name this widget was built for.
    fn name(&self) -> &str;

    /// Metadata kind.
    fn kind(&self) -> WidgetKind;

    /// Readiness event source. A widget without one is never tracked.
    fn observable(&self) -> Option<SharedObservable>;

    /// Begin setup. Fires `ready` or `setup_failed` exactly once, possibly
    /// before returning.
    fn start(&self);

    /// Summary of this widget and its children.
    fn describe(&self) -> WidgetNode;

    /// Child widgets, for container kinds.
    fn children(&self) -> &[Box<dyn Widget>] {
        &[]
    }
}

impl std::fmt::Debug for dyn Widget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.describe(), f)
    }
}

/// Factory seam between metadata kinds and widget implementations.
pub trait WidgetFactory: Send + Sync {
    /// Construct a widget for `spec`. The container is available for
    /// resolving collaborators (child factories, shared services).
    fn create(
        &self,
        spec: &FieldSpec,
        container: &ServiceContainer,
    ) -> Result<Box<dyn Widget>, WidgetError>;
}

/// Shared factory handle, as stored in the container.
pub type SharedWidgetFactory = Arc<dyn WidgetFactory>;

fn default_matches_kind(kind: WidgetKind, value: &JsonValue) -> bool {
    match kind {
        WidgetKind::Text => value.is_string(),
        WidgetKind::Number => value.is_number(),
        WidgetKind::Checkbox => value.is_boolean(),
        WidgetKind::Date => value.as_str().is_some_and(is_iso_date),
        WidgetKind::Select | WidgetKind::Group => true,
    }
}

fn is_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit())
}

// ============================================================================
// InputWidget - text / number / checkbox / date
// ============================================================================

/// Scalar input widget. Setup validates the default value against the kind
/// and reports synchronously.
pub struct InputWidget {
    spec: FieldSpec,
    emitter: Emitter,
}

impl InputWidget {
    /// Build from a field spec.
    pub fn new(spec: FieldSpec) -> Self {
        Self {
            spec,
            emitter: Emitter::new(),
        }
    }
}

impl Widget for InputWidget {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn kind(&self) -> WidgetKind {
        self.spec.kind
    }

    fn observable(&self) -> Option<SharedObservable> {
        Some(Arc::new(self.emitter.clone()))
    }

    fn start(&self) {
        if let Some(default) = &self.spec.default {
            if !default_matches_kind(self.spec.kind, default) {
                tracing::warn!(field = %self.spec.name, kind = %self.spec.kind, "default value does not match kind");
                self.emitter.emit(
                    SETUP_FAILED_EVENT,
                    json!({
                        "field": self.spec.name,
                        "error": format!("default value does not match kind '{}'", self.spec.kind),
                    }),
                );
                return;
            }
        }
        self.emitter.emit(READY_EVENT, json!({ "field": self.spec.name }));
    }

    fn describe(&self) -> WidgetNode {
        WidgetNode {
            name: self.spec.name.clone(),
            kind: self.spec.kind,
            label: self.spec.display_label().to_string(),
            required: self.spec.required,
            option_count: None,
            children: Vec::new(),
        }
    }
}

// ============================================================================
// SelectWidget - single choice, inline or file-sourced options
// ============================================================================

/// Choice widget. Inline options resolve synchronously; an `options_src`
/// path is loaded on a spawned task and reports on completion — callers need
/// a tokio runtime for file-sourced selects.
pub struct SelectWidget {
    spec: FieldSpec,
    emitter: Emitter,
    resolved: Arc<Mutex<Vec<ChoiceSpec>>>,
}

impl SelectWidget {
    /// Build from a field spec.
    pub fn new(spec: FieldSpec) -> Self {
        Self {
            spec,
            emitter: Emitter::new(),
            resolved: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Options after setup; empty until `ready` has fired.
    pub fn resolved_options(&self) -> Vec<ChoiceSpec> {
        self.resolved.lock().clone()
    }

    async fn load_choices(path: PathBuf) -> Result<Vec<ChoiceSpec>, WidgetError> {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| WidgetError::OptionsLoad {
                path: path.clone(),
                source,
            })?;
        serde_json::from_str(&content)
            .map_err(|source| WidgetError::OptionsParse { path, source })
    }

    fn finish(
        emitter: &Emitter,
        resolved: &Mutex<Vec<ChoiceSpec>>,
        field: &str,
        default: Option<&JsonValue>,
        choices: Vec<ChoiceSpec>,
    ) {
        if let Some(default) = default {
            if !choices.iter().any(|c| &c.value == default) {
                emitter.emit(
                    SETUP_FAILED_EVENT,
                    json!({
                        "field": field,
                        "error": format!("default value {default} is not among the options"),
                    }),
                );
                return;
            }
        }
        let count = choices.len();
        *resolved.lock() = choices;
        emitter.emit(READY_EVENT, json!({ "field": field, "options": count }));
    }
}

impl Widget for SelectWidget {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn kind(&self) -> WidgetKind {
        self.spec.kind
    }

    fn observable(&self) -> Option<SharedObservable> {
        Some(Arc::new(self.emitter.clone()))
    }

    fn start(&self) {
        match &self.spec.options_src {
            Some(src) => {
                let path = PathBuf::from(src);
                let emitter = self.emitter.clone();
                let resolved = Arc::clone(&self.resolved);
                let field = self.spec.name.clone();
                let default = self.spec.default.clone();
                tracing::debug!(field = %field, path = %path.display(), "loading select options");

                tokio::spawn(async move {
                    match Self::load_choices(path).await {
                        Ok(choices) => {
                            Self::finish(&emitter, &resolved, &field, default.as_ref(), choices);
                        }
                        Err(err) => {
                            tracing::warn!(field = %field, error = %err, "options source failed");
                            emitter.emit(
                                SETUP_FAILED_EVENT,
                                json!({ "field": field, "error": err.to_string() }),
                            );
                        }
                    }
                });
            }
            None => {
                Self::finish(
                    &self.emitter,
                    &self.resolved,
                    &self.spec.name,
                    self.spec.default.as_ref(),
                    self.spec.options.clone(),
                );
            }
        }
    }

    fn describe(&self) -> WidgetNode {
        WidgetNode {
            name: self.spec.name.clone(),
            kind: self.spec.kind,
            label: self.spec.display_label().to_string(),
            required: self.spec.required,
            option_count: Some(self.resolved.lock().len()),
            children: Vec::new(),
        }
    }
}

// ============================================================================
// GroupWidget - container, ready when all children are
// ============================================================================

/// Container widget. Readiness is aggregated from its children: the group
/// fires `ready` only after every child has, and `setup_failed` as soon as
/// any child fails.
pub struct GroupWidget {
    spec: FieldSpec,
    emitter: Emitter,
    children: Vec<Box<dyn Widget>>,
    aggregator: EventAggregator,
}

impl GroupWidget {
    /// Build from a field spec and pre-constructed children.
    pub fn new(spec: FieldSpec, children: Vec<Box<dyn Widget>>) -> Self {
        Self {
            spec,
            emitter: Emitter::new(),
            children,
            aggregator: EventAggregator::new(),
        }
    }
}

impl Widget for GroupWidget {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn kind(&self) -> WidgetKind {
        self.spec.kind
    }

    fn observable(&self) -> Option<SharedObservable> {
        Some(Arc::new(self.emitter.clone()))
    }

    fn start(&self) {
        let name = self.spec.name.clone();
        let ready_emitter = self.emitter.clone();
        let failed_emitter = self.emitter.clone();

        let handlers = SessionHandlers::new(move |captured: crate::events::CaptureMap| {
            let reported: usize = captured.values().map(Vec::len).sum();
            ready_emitter.emit(READY_EVENT, json!({ "field": name, "children": reported }));
        })
        .with_failure(move |event| {
            failed_emitter.emit(SETUP_FAILED_EVENT, event.payload);
        })
        .with_veto(|event| event.name != SETUP_FAILED_EVENT);

        let observables = self.children.iter().map(|child| child.observable());
        if let Err(err) = self.aggregator.register_objects(
            observables,
            &[READY_EVENT, SETUP_FAILED_EVENT],
            handlers,
        ) {
            tracing::warn!(group = %self.spec.name, error = %err, "group started twice; ignoring");
            return;
        }

        for child in &self.children {
            child.start();
        }
    }

    fn describe(&self) -> WidgetNode {
        WidgetNode {
            name: self.spec.name.clone(),
            kind: self.spec.kind,
            label: self.spec.display_label().to_string(),
            required: self.spec.required,
            option_count: None,
            children: self.children.iter().map(|c| c.describe()).collect(),
        }
    }

    fn children(&self) -> &[Box<dyn Widget>] {
        &self.children
    }
}

// ============================================================================
// Built-in factories
// ============================================================================

/// Factory for scalar input kinds.
pub struct InputWidgetFactory;

impl WidgetFactory for InputWidgetFactory {
    fn create(
        &self,
        spec: &FieldSpec,
        _container: &ServiceContainer,
    ) -> Result<Box<dyn Widget>, WidgetError> {
        Ok(Box::new(InputWidget::new(spec.clone())))
    }
}

/// Factory for select widgets.
pub struct SelectWidgetFactory;

impl WidgetFactory for SelectWidgetFactory {
    fn create(
        &self,
        spec: &FieldSpec,
        _container: &ServiceContainer,
    ) -> Result<Box<dyn Widget>, WidgetError> {
        Ok(Box::new(SelectWidget::new(spec.clone())))
    }
}

/// Factory for group widgets; resolves child factories through the container.
pub struct GroupWidgetFactory;

impl WidgetFactory for GroupWidgetFactory {
    fn create(
        &self,
        spec: &FieldSpec,
        container: &ServiceContainer,
    ) -> Result<Box<dyn Widget>, WidgetError> {
        let mut children = Vec::with_capacity(spec.children.len());
        for child_spec in &spec.children {
            let factory =
                container.get_cloned::<SharedWidgetFactory>(&widget_service_key(child_spec.kind))?;
            children.push(factory.create(child_spec, container)?);
        }
        Ok(Box::new(GroupWidget::new(spec.clone(), children)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Observable;
    use crate::metadata::WidgetKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn observe(widget: &dyn Widget) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let ready = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let observable = widget.observable().expect("widget is observable");

        let r = ready.clone();
        observable.subscribe_once(READY_EVENT, Box::new(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        let f = failed.clone();
        observable.subscribe_once(SETUP_FAILED_EVENT, Box::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));

        (ready, failed)
    }

    #[test]
    fn test_input_widget_ready_synchronously() {
        let widget = InputWidget::new(FieldSpec::new("username", WidgetKind::Text));
        let (ready, failed) = observe(&widget);

        widget.start();
        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_input_widget_rejects_mismatched_default() {
        let spec = FieldSpec {
            default: Some(json!("not a number")),
            ..FieldSpec::new("age", WidgetKind::Number)
        };
        let widget = InputWidget::new(spec);
        let (ready, failed) = observe(&widget);

        widget.start();
        assert_eq!(ready.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_date_default_validation() {
        let good = InputWidget::new(FieldSpec {
            default: Some(json!("2024-01-31")),
            ..FieldSpec::new("when", WidgetKind::Date)
        });
        let (ready, _) = observe(&good);
        good.start();
        assert_eq!(ready.load(Ordering::SeqCst), 1);

        let bad = InputWidget::new(FieldSpec {
            default: Some(json!("31/01/2024")),
            ..FieldSpec::new("when", WidgetKind::Date)
        });
        let (_, failed) = observe(&bad);
        bad.start();
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_select_inline_options_resolve_synchronously() {
        let spec = FieldSpec {
            options: vec![
                ChoiceSpec { value: json!("en"), label: None },
                ChoiceSpec { value: json!("de"), label: None },
            ],
            default: Some(json!("de")),
            ..FieldSpec::new("locale", WidgetKind::Select)
        };
        let widget = SelectWidget::new(spec);
        let (ready, failed) = observe(&widget);

        widget.start();
        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
        assert_eq!(widget.resolved_options().len(), 2);
    }

    #[test]
    fn test_select_default_outside_options_fails() {
        let spec = FieldSpec {
            options: vec![ChoiceSpec { value: json!("en"), label: None }],
            default: Some(json!("fr")),
            ..FieldSpec::new("locale", WidgetKind::Select)
        };
        let widget = SelectWidget::new(spec);
        let (ready, failed) = observe(&widget);

        widget.start();
        assert_eq!(ready.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    /// Subscribe a oneshot to `event` before `start` so the spawned loader
    /// cannot fire first.
    fn settle_on(widget: &dyn Widget, event: &str) -> tokio::sync::oneshot::Receiver<JsonValue> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        widget.observable().unwrap().subscribe_once(
            event,
            Box::new(move |event| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(event.payload.clone());
                }
            }),
        );
        rx
    }

    #[tokio::test]
    async fn test_select_loads_options_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locales.json");
        std::fs::write(
            &path,
            r#"[{"value":"en","label":"English"},{"value":"de"}]"#,
        )
        .unwrap();

        let spec = FieldSpec {
            options_src: Some(path.display().to_string()),
            ..FieldSpec::new("locale", WidgetKind::Select)
        };
        let widget = SelectWidget::new(spec);

        let ready = settle_on(&widget, READY_EVENT);
        widget.start();
        let payload = tokio::time::timeout(std::time::Duration::from_secs(5), ready)
            .await
            .expect("ready within deadline")
            .unwrap();

        assert_eq!(payload["options"], json!(2));
        assert_eq!(widget.resolved_options().len(), 2);
    }

    #[tokio::test]
    async fn test_select_missing_options_file_reports_failure() {
        let spec = FieldSpec {
            options_src: Some("/definitely/not/here.json".to_string()),
            ..FieldSpec::new("locale", WidgetKind::Select)
        };
        let widget = SelectWidget::new(spec);

        let failed = settle_on(&widget, SETUP_FAILED_EVENT);
        widget.start();
        let payload = tokio::time::timeout(std::time::Duration::from_secs(5), failed)
            .await
            .expect("failure within deadline")
            .unwrap();

        assert_eq!(payload["field"], json!("locale"));
    }

    #[test]
    fn test_group_ready_after_all_children() {
        let children: Vec<Box<dyn Widget>> = vec![
            Box::new(InputWidget::new(FieldSpec::new("a", WidgetKind::Text))),
            Box::new(InputWidget::new(FieldSpec::new("b", WidgetKind::Checkbox))),
        ];
        let group = GroupWidget::new(FieldSpec::new("grp", WidgetKind::Group), children);
        let (ready, failed) = observe(&group);

        group.start();
        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_group_propagates_child_failure() {
        let bad_child = InputWidget::new(FieldSpec {
            default: Some(json!(42)),
            ..FieldSpec::new("bad", WidgetKind::Text)
        });
        let children: Vec<Box<dyn Widget>> = vec![
            Box::new(InputWidget::new(FieldSpec::new("ok", WidgetKind::Text))),
            Box::new(bad_child),
        ];
        let group = GroupWidget::new(FieldSpec::new("grp", WidgetKind::Group), children);
        let (ready, failed) = observe(&group);

        group.start();
        assert_eq!(ready.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_group_factory_builds_nested_tree() {
        let container = ServiceContainer::new();
        container.set_value::<SharedWidgetFactory>(
            widget_service_key(WidgetKind::Text),
            Arc::new(InputWidgetFactory),
        );
        container.set_value::<SharedWidgetFactory>(
            widget_service_key(WidgetKind::Group),
            Arc::new(GroupWidgetFactory),
        );

        let spec = FieldSpec {
            children: vec![
                FieldSpec::new("inner_text", WidgetKind::Text),
                FieldSpec {
                    children: vec![FieldSpec::new("deep", WidgetKind::Text)],
                    ..FieldSpec::new("inner_group", WidgetKind::Group)
                },
            ],
            ..FieldSpec::new("outer", WidgetKind::Group)
        };

        let widget = GroupWidgetFactory.create(&spec, &container).unwrap();
        let node = widget.describe();
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[1].children.len(), 1);
    }

    #[test]
    fn test_group_factory_fails_on_unregistered_child_kind() {
        let container = ServiceContainer::new();
        let spec = FieldSpec {
            children: vec![FieldSpec::new("x", WidgetKind::Text)],
            ..FieldSpec::new("outer", WidgetKind::Group)
        };

        let err = GroupWidgetFactory.create(&spec, &container).unwrap_err();
        assert!(matches!(err, WidgetError::Service(ServiceError::NotFound { .. })));
    }
}
