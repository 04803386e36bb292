//! Default widget set registration.

use armature_core::{
    widget_service_key, GroupWidgetFactory, InputWidgetFactory, SelectWidgetFactory,
    ServiceContainer, SharedWidgetFactory, WidgetKind,
};
use std::sync::Arc;

/// Build a container with the built-in widget set registered under
/// `widget.<kind>` service names, as shared services.
pub fn default_container() -> Arc<ServiceContainer> {
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

    tracing::debug!(
        services = container.service_names().len(),
        "default widget set registered"
    );
    Arc::new(container)
}

/// Widget kind names registered in a container, derived from its
/// `widget.<kind>` service names.
pub fn registered_widget_kinds(container: &ServiceContainer) -> Vec<String> {
    container
        .service_names()
        .into_iter()
        .filter_map(|name| name.strip_prefix("widget.").map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_container_covers_every_kind() {
        let container = default_container();
        for kind in WidgetKind::all() {
            assert!(container.has(&widget_service_key(*kind)), "missing {kind}");
        }
    }

    #[test]
    fn test_registered_kinds_sorted_names() {
        let container = default_container();
        let kinds = registered_widget_kinds(&container);
        assert_eq!(kinds.len(), WidgetKind::all().len());
        assert!(kinds.contains(&"select".to_string()));
    }
}
