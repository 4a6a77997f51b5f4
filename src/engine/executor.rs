// ABOUTME: Task sequence engine driving sequential runs over the step tree
// ABOUTME: Publishes variables, applies enabled/condition/group rules, and dispatches steps to executors

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::condition::ConditionEvaluator;
use super::context::ExecutionContext;
use super::error::ExecutionError;
use super::reporter::ProgressReporter;
use super::result::{ExecutionStatus, StepExecutionResult};
use crate::model::{TaskSequence, TaskSequenceStep};
use crate::steps::StepRegistry;
use crate::variables::{builtin, ReadOnlyVariableError, VariableStore};

/// Runs task sequences against a registry of step executors.
///
/// Each run clears the engine's variable store before publishing variables, so one
/// engine drives one run at a time. Use [`crate::engine::RunQueue`] for concurrent runs.
pub struct TaskSequenceEngine {
    registry: Arc<StepRegistry>,
    variables: Arc<VariableStore>,
    evaluator: ConditionEvaluator,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl TaskSequenceEngine {
    pub fn new(registry: StepRegistry) -> Self {
        Self::with_shared_registry(Arc::new(registry))
    }

    pub fn with_shared_registry(registry: Arc<StepRegistry>) -> Self {
        Self {
            registry,
            variables: Arc::new(VariableStore::new()),
            evaluator: ConditionEvaluator::new(),
            reporter: None,
        }
    }

    /// Runs against an injected store. The store is cleared when a run starts.
    pub fn with_variable_store(mut self, variables: Arc<VariableStore>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn variables(&self) -> &Arc<VariableStore> {
        &self.variables
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub(crate) fn runner(&self) -> StepRunner {
        StepRunner {
            registry: Arc::clone(&self.registry),
            evaluator: self.evaluator,
            reporter: self.reporter.clone(),
        }
    }

    /// Runs top-level steps one after another. Stops at the first failed step that does
    /// not continue on error, or before the next step once `cancel` fires.
    #[instrument(skip_all, fields(sequence = %sequence.name, mode = "sequential"))]
    pub async fn execute(
        &self,
        sequence: &TaskSequence,
        cancel: CancellationToken,
    ) -> ExecutionContext {
        let mut context = match self.begin(sequence) {
            Ok(context) => context,
            Err(context) => return self.end(context).await,
        };
        let runner = self.runner();

        for step in &sequence.steps {
            if cancel.is_cancelled() {
                warn!("Cancellation requested; stopping before step '{}'", step.name);
                context.status = ExecutionStatus::Cancelled;
                break;
            }

            let result = runner.run_step(step, &mut context, &cancel).await;
            let failed = result.is_failed();
            runner.record(&mut context, result).await;
            runner.report_progress(&context).await;

            if failed && !step.continue_on_error {
                error!("Step '{}' failed; stopping task sequence", step.name);
                context.status = ExecutionStatus::Failed;
                break;
            }
        }

        context.finish(ExecutionStatus::Completed);
        self.end(context).await
    }

    /// Creates the run context and publishes variables. On a publishing failure the
    /// returned context is already `Failed`.
    pub(crate) fn begin(
        &self,
        sequence: &TaskSequence,
    ) -> std::result::Result<ExecutionContext, ExecutionContext> {
        let mut context = ExecutionContext::new(sequence, Arc::clone(&self.variables));
        context.mark_started();

        info!(
            "Starting task sequence: {} (execution_id: {}, {} step(s))",
            sequence.name,
            context.execution_id,
            sequence.step_count()
        );

        if let Err(e) = self.publish_variables(sequence, &mut context) {
            error!("Failed to publish variables: {}", e);
            context.finish(ExecutionStatus::Failed);
            return Err(context);
        }
        Ok(context)
    }

    pub(crate) async fn end(&self, context: ExecutionContext) -> ExecutionContext {
        self.runner().report_progress(&context).await;

        let summary = context.summary();
        info!(
            "Task sequence finished with status: {} ({} result(s), {} failed)",
            context.status, summary.total_steps, summary.failed_steps
        );
        context
    }

    // Built-ins go first so a declared variable with the same name is rejected.
    fn publish_variables(
        &self,
        sequence: &TaskSequence,
        context: &mut ExecutionContext,
    ) -> std::result::Result<(), ReadOnlyVariableError> {
        self.variables.clear();

        let machine_name = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|e| {
                warn!("Unable to read host name: {}", e);
                String::new()
            });

        self.variables
            .set_read_only(builtin::TASK_SEQUENCE_ID, sequence.id.as_str());
        self.variables
            .set_read_only(builtin::TASK_SEQUENCE_NAME, sequence.name.as_str());
        self.variables
            .set_read_only(builtin::TASK_SEQUENCE_VERSION, sequence.version.as_str());
        self.variables
            .set_read_only(builtin::MACHINE_NAME, machine_name);

        for variable in &sequence.variables {
            self.variables.set(&variable.name, variable.value.as_str())?;
            context
                .variables
                .insert(variable.name.clone(), variable.value.clone());
            debug!("Published variable {} = {}", variable.name, variable.display_value());
        }

        Ok(())
    }
}

/// The per-step half of the engine. Cheap to clone into parallel branches.
#[derive(Clone)]
pub(crate) struct StepRunner {
    registry: Arc<StepRegistry>,
    evaluator: ConditionEvaluator,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl StepRunner {
    /// Runs one step and, for groups, its subtree. Child results are recorded on
    /// `context` as they finish; the returned result is the step's own.
    pub fn run_step<'a>(
        &'a self,
        step: &'a TaskSequenceStep,
        context: &'a mut ExecutionContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, StepExecutionResult> {
        async move {
            context.current_step_id = Some(step.id.clone());
            let result = StepExecutionResult::start(step);

            if !step.enabled {
                info!("Skipping disabled step: {}", step.name);
                return result.completed();
            }

            if !self
                .evaluator
                .evaluate_all(&step.conditions, context.variable_store())
            {
                info!("Conditions not met, skipping step: {}", step.name);
                return result.completed();
            }

            info!("Executing step: {} (type: {})", step.name, step.kind);

            if step.is_group() {
                self.run_group(step, result, context, cancel).await
            } else {
                self.dispatch(step, result, context, cancel).await
            }
        }
        .boxed()
    }

    async fn run_group(
        &self,
        step: &TaskSequenceStep,
        result: StepExecutionResult,
        context: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> StepExecutionResult {
        for child in &step.children {
            let child_result = self.run_step(child, context, cancel).await;
            let failed = child_result.is_failed();
            self.record(context, child_result).await;

            if failed && !child.continue_on_error {
                warn!("Group '{}' stopped: child '{}' failed", step.name, child.name);
                return result.failed(format!("Child step failed: {}", child.name));
            }
        }
        result.completed()
    }

    async fn dispatch(
        &self,
        step: &TaskSequenceStep,
        result: StepExecutionResult,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> StepExecutionResult {
        let Some(executor) = self.registry.resolve(step) else {
            let err = ExecutionError::NoExecutorFound { kind: step.kind };
            error!("{}", err);
            return result.failed(err.to_string());
        };

        let outcome = AssertUnwindSafe(executor.execute(step, context, cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(mut executed)) => {
                if !executed.is_finished() {
                    let message = executed.error_message.take();
                    executed.mark_completed(ExecutionStatus::Completed, message);
                } else if executed.end_time.is_none() {
                    executed.end_time = Some(chrono::Utc::now());
                }
                executed
            }
            Ok(Err(e)) => {
                let err = ExecutionError::ExecutorFailure {
                    step: step.name.clone(),
                    message: e.to_string(),
                };
                error!("{}", err);
                result.failed(err.to_string())
            }
            Err(panic) => {
                let err = ExecutionError::ExecutorPanicked {
                    step: step.name.clone(),
                    message: panic_message(panic.as_ref()),
                };
                error!("{}", err);
                result.failed(err.to_string())
            }
        }
    }

    pub async fn record(&self, context: &mut ExecutionContext, result: StepExecutionResult) {
        self.report_step(&result).await;
        context.record(result);
    }

    pub async fn report_step(&self, result: &StepExecutionResult) {
        if let Some(ref reporter) = self.reporter {
            if let Err(e) = reporter.report_step(result).await {
                warn!("Progress reporter failed on step '{}': {}", result.step_name, e);
            }
        }
    }

    pub async fn report_progress(&self, context: &ExecutionContext) {
        if let Some(ref reporter) = self.reporter {
            if let Err(e) = reporter.report_progress(context).await {
                warn!("Progress reporter failed: {}", e);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
