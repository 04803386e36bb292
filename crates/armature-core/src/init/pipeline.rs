//! Priority-ordered initialization runner.
//!
//! An [`InitPipeline`] executes registered [`StepHandler`]s strictly in
//! ascending priority order over one shared [`ParamBag`]. Each step is an
//! async function awaited to completion before the next begins; any step may
//! abort the whole run with a reason, after which no further steps execute.
//!
//! Steps are inserted at registration time only. A run consumes the pipeline;
//! completed or aborted runs are not resumable — re-running requires a fresh
//! pipeline and parameter bag. No retries are built in; callers own retry
//! policy.

use super::params::ParamBag;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of one step.
pub enum StepResult {
    /// Step succeeded; advance to the next step with the (possibly mutated)
    /// parameter bag.
    Continue(ParamBag),
    /// Halt the run and surface `reason` to the caller unchanged.
    Abort {
        /// Human-readable abort reason.
        reason: String,
        /// Optional structured detail.
        detail: Option<JsonValue>,
    },
}

impl StepResult {
    /// Advance with the given bag.
    pub fn advance(params: ParamBag) -> Self {
        Self::Continue(params)
    }

    /// Abort with a reason.
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort {
            reason: reason.into(),
            detail: None,
        }
    }

    /// Abort with a reason and structured detail.
    pub fn abort_with(reason: impl Into<String>, detail: JsonValue) -> Self {
        Self::Abort {
            reason: reason.into(),
            detail: Some(detail),
        }
    }
}

/// One initialization step.
///
/// `priority` is the primary sort key (ascending); `weight` breaks ties among
/// equal priorities, and insertion order breaks remaining ties.
#[async_trait]
pub trait StepHandler: Send {
    /// Step name, used in logs and abort reports.
    fn name(&self) -> &str;

    /// Ascending execution order.
    fn priority(&self) -> i32;

    /// Tie-break among equal priorities. Defaults to 0.
    fn weight(&self) -> i32 {
        0
    }

    /// Execute the step over the shared parameter bag.
    async fn run(&mut self, params: ParamBag) -> StepResult;
}

/// Type alias for boxed async step callbacks.
pub type StepCallback = Box<dyn FnMut(ParamBag) -> BoxFuture<'static, StepResult> + Send>;

/// Closure-backed [`StepHandler`].
///
/// ```rust,ignore
/// let step = FnStep::new("resolve", 200, |mut params| async move {
///     params.insert("resolved", true);
///     StepResult::advance(params)
/// });
/// ```
pub struct FnStep {
    name: String,
    priority: i32,
    weight: i32,
    callback: StepCallback,
}

impl FnStep {
    /// Wrap an async closure as a step.
    pub fn new<F, Fut>(name: impl Into<String>, priority: i32, mut callback: F) -> Self
    where
        F: FnMut(ParamBag) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = StepResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority,
            weight: 0,
            callback: Box::new(move |params| Box::pin(callback(params))),
        }
    }

    /// Set the tie-break weight.
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }
}

#[async_trait]
impl StepHandler for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn weight(&self) -> i32 {
        self.weight
    }

    async fn run(&mut self, params: ParamBag) -> StepResult {
        (self.callback)(params).await
    }
}

/// State of an initialization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Steps registered, run not started.
    Pending,
    /// A run is in progress.
    Running,
    /// Every step ran to completion.
    Completed,
    /// A step aborted the run.
    Aborted,
}

/// Shared observer handle for a pipeline's status.
///
/// Remains readable after the pipeline itself is consumed by
/// [`InitPipeline::run`].
#[derive(Clone)]
pub struct RunStatusHandle(Arc<Mutex<RunStatus>>);

impl RunStatusHandle {
    /// Current run status.
    pub fn get(&self) -> RunStatus {
        *self.0.lock()
    }
}

/// Abort surfaced from a run.
#[derive(Debug, Error)]
#[error("initialization aborted in step '{step}': {reason}")]
pub struct InitAbort {
    /// Name of the step that aborted.
    pub step: String,
    /// The reason supplied by the step, unchanged.
    pub reason: String,
    /// Optional structured detail supplied by the step.
    pub detail: Option<JsonValue>,
}

/// Priority-ordered, abortable initialization runner.
pub struct InitPipeline {
    steps: Vec<Box<dyn StepHandler>>,
    status: Arc<Mutex<RunStatus>>,
}

impl InitPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            status: Arc::new(Mutex::new(RunStatus::Pending)),
        }
    }

    /// Register a step. Chainable; ordering is decided at run time by
    /// (priority, weight, insertion order).
    pub fn add(mut self, step: Box<dyn StepHandler>) -> Self {
        self.steps.push(step);
        self
    }

    /// Register an async closure as a step at the given priority.
    pub fn add_fn<F, Fut>(self, name: impl Into<String>, priority: i32, callback: F) -> Self
    where
        F: FnMut(ParamBag) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = StepResult> + Send + 'static,
    {
        self.add(Box::new(FnStep::new(name, priority, callback)))
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no steps are registered.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Current status of this pipeline's (single) run.
    pub fn status(&self) -> RunStatus {
        *self.status.lock()
    }

    /// Observer handle that outlives the pipeline.
    pub fn status_handle(&self) -> RunStatusHandle {
        RunStatusHandle(Arc::clone(&self.status))
    }

    /// Execute all steps in ascending (priority, weight, insertion) order.
    ///
    /// Consumes the pipeline. Returns the final parameter bag on completion,
    /// or the abort unchanged from the step that raised it.
    pub async fn run(mut self, params: ParamBag) -> Result<ParamBag, InitAbort> {
        // Stable sort: insertion order is the final tie-break.
        self.steps
            .sort_by_key(|step| (step.priority(), step.weight()));
        *self.status.lock() = RunStatus::Running;

        let total = self.steps.len();
        let mut bag = params;

        for (index, step) in self.steps.iter_mut().enumerate() {
            tracing::debug!(
                step = step.name(),
                priority = step.priority(),
                position = index + 1,
                total,
                "running initialization step"
            );

            match step.run(bag).await {
                StepResult::Continue(next) => bag = next,
                StepResult::Abort { reason, detail } => {
                    tracing::debug!(step = step.name(), %reason, "initialization aborted");
                    *self.status.lock() = RunStatus::Aborted;
                    return Err(InitAbort {
                        step: step.name().to_string(),
                        reason,
                        detail,
                    });
                }
            }
        }

        *self.status.lock() = RunStatus::Completed;
        Ok(bag)
    }
}

impl Default for InitPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_step(name: &str, priority: i32) -> Box<FnStep> {
        let name_owned = name.to_string();
        Box::new(FnStep::new(name, priority, move |mut params: ParamBag| {
            let name = name_owned.clone();
            async move {
                params
                    .get_mut::<Vec<String>>("order")
                    .expect("order vec present")
                    .push(name);
                StepResult::advance(params)
            }
        }))
    }

    #[tokio::test]
    async fn test_steps_run_in_priority_order() {
        // Registered out of order: 900, 100, 600.
        let pipeline = InitPipeline::new()
            .add(recording_step("late", 900))
            .add(recording_step("early", 100))
            .add(recording_step("middle", 600));

        let bag = ParamBag::new().with("order", Vec::<String>::new());
        let mut result = pipeline.run(bag).await.unwrap();

        let order = result.take::<Vec<String>>("order").unwrap();
        assert_eq!(order, vec!["early", "middle", "late"]);
    }

    #[tokio::test]
    async fn test_equal_priority_ordered_by_weight_then_insertion() {
        let heavy = Box::new(
            FnStep::new("heavy", 100, |mut params: ParamBag| async move {
                params.get_mut::<Vec<String>>("order").unwrap().push("heavy".into());
                StepResult::advance(params)
            })
            .with_weight(10),
        );

        let pipeline = InitPipeline::new()
            .add(heavy)
            .add(recording_step("first", 100))
            .add(recording_step("second", 100));

        let bag = ParamBag::new().with("order", Vec::<String>::new());
        let mut result = pipeline.run(bag).await.unwrap();

        let order = result.take::<Vec<String>>("order").unwrap();
        assert_eq!(order, vec!["first", "second", "heavy"]);
    }

    #[tokio::test]
    async fn test_abort_skips_later_steps_and_surfaces_reason() {
        let pipeline = InitPipeline::new()
            .add(recording_step("first", 100))
            .add_fn("failing", 200, |_params| async move {
                StepResult::abort_with("metadata rejected", serde_json::json!({"field": "name"}))
            })
            .add(recording_step("never", 300));

        let status = pipeline.status_handle();
        let bag = ParamBag::new().with("order", Vec::<String>::new());
        let err = pipeline.run(bag).await.unwrap_err();

        assert_eq!(err.step, "failing");
        assert_eq!(err.reason, "metadata rejected");
        assert_eq!(err.detail, Some(serde_json::json!({"field": "name"})));
        assert_eq!(status.get(), RunStatus::Aborted);
    }

    #[tokio::test]
    async fn test_async_step_awaited_before_next() {
        let pipeline = InitPipeline::new()
            .add_fn("slow", 100, |mut params: ParamBag| async move {
                tokio::task::yield_now().await;
                params.insert("slow_done", true);
                StepResult::advance(params)
            })
            .add_fn("check", 200, |params: ParamBag| async move {
                assert_eq!(params.get::<bool>("slow_done"), Some(&true));
                StepResult::advance(params)
            });

        pipeline.run(ParamBag::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let pipeline = InitPipeline::new().add(recording_step("only", 100));
        assert_eq!(pipeline.status(), RunStatus::Pending);

        let status = pipeline.status_handle();
        let bag = ParamBag::new().with("order", Vec::<String>::new());
        pipeline.run(bag).await.unwrap();
        assert_eq!(status.get(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_empty_pipeline_completes() {
        let pipeline = InitPipeline::new();
        let bag = ParamBag::new().with("untouched", 7u8);
        let result = pipeline.run(bag).await.unwrap();
        assert_eq!(result.get::<u8>("untouched"), Some(&7));
    }
}
