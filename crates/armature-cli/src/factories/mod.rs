//! Factory functions assembling the service container.
//!
//! This module is the composition root where concrete widget implementations
//! are registered and handed out as trait objects; everything downstream
//! resolves collaborators by service name only.

pub mod widgets;

pub use widgets::{default_container, registered_widget_kinds};
