//! Command implementations.

pub mod build;
pub mod kinds;
pub mod validate;
