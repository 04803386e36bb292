//! Staged initialization.
//!
//! A [`ParamBag`] threads shared state through the ordered steps of an
//! [`InitPipeline`]; steps implement [`StepHandler`] (or wrap a closure with
//! [`FnStep`]) and either advance or abort the run.

pub mod params;
pub mod pipeline;

pub use params::ParamBag;
pub use pipeline::{
    FnStep, InitAbort, InitPipeline, RunStatus, RunStatusHandle, StepCallback, StepHandler,
    StepResult,
};
