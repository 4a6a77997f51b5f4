// ABOUTME: Bounded run queue for executing many task sequences in the background
// ABOUTME: Hands out run ids whose state, cancellation, and final context are addressable later

use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::ExecutionContext;
use super::executor::TaskSequenceEngine;
use super::reporter::ProgressReporter;
use super::result::ExecutionStatus;
use crate::model::TaskSequence;
use crate::steps::StepRegistry;
use crate::variables::VariableStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Queued,
    Running,
    Finished(ExecutionStatus),
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Finished(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Sequential,
    Parallel {
        max_parallelism: usize,
    },
}

#[derive(Debug, Clone)]
pub struct RunInfo {
    pub run_id: String,
    pub sequence_name: String,
    pub state: RunState,
}

struct RunEntry {
    sequence_name: String,
    state: watch::Receiver<RunState>,
    cancel: CancellationToken,
    context: Option<ExecutionContext>,
}

type RunTable = Arc<Mutex<IndexMap<String, RunEntry>>>;

/// Runs submitted sequences on background tasks, at most `max_concurrent_runs` at
/// once. Every run gets its own engine and variable store.
pub struct RunQueue {
    registry: Arc<StepRegistry>,
    reporter: Option<Arc<dyn ProgressReporter>>,
    permits: Arc<Semaphore>,
    runs: RunTable,
}

impl RunQueue {
    pub fn new(registry: Arc<StepRegistry>, max_concurrent_runs: usize) -> Self {
        Self {
            registry,
            reporter: None,
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            runs: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Queues `sequence` and returns its run id. Must be called within a tokio runtime.
    pub fn submit(&self, sequence: TaskSequence, mode: RunMode) -> String {
        let run_id = uuid::Uuid::new_v4().to_string();
        let (state_tx, state_rx) = watch::channel(RunState::Queued);
        let cancel = CancellationToken::new();

        lock(&self.runs).insert(
            run_id.clone(),
            RunEntry {
                sequence_name: sequence.name.clone(),
                state: state_rx,
                cancel: cancel.clone(),
                context: None,
            },
        );
        info!("Queued run {} for '{}'", run_id, sequence.name);

        let registry = Arc::clone(&self.registry);
        let reporter = self.reporter.clone();
        let permits = Arc::clone(&self.permits);
        let runs = Arc::clone(&self.runs);
        let id = run_id.clone();

        tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };

            let context = match permit {
                Some(_permit) => {
                    state_tx.send_replace(RunState::Running);
                    debug!("Run {} started", id);

                    let mut engine = TaskSequenceEngine::with_shared_registry(registry);
                    if let Some(reporter) = reporter {
                        engine = engine.with_reporter(reporter);
                    }
                    match mode {
                        RunMode::Sequential => engine.execute(&sequence, cancel).await,
                        RunMode::Parallel { max_parallelism } => {
                            engine
                                .execute_parallel(&sequence, max_parallelism, cancel)
                                .await
                        }
                    }
                }
                None => {
                    warn!("Run {} cancelled while queued", id);
                    let mut context =
                        ExecutionContext::new(&sequence, Arc::new(VariableStore::new()));
                    context.finish(ExecutionStatus::Cancelled);
                    context
                }
            };

            let status = context.status;
            if let Some(entry) = lock(&runs).get_mut(&id) {
                entry.context = Some(context);
            }
            state_tx.send_replace(RunState::Finished(status));
            info!("Run {} finished: {}", id, status);
        });

        run_id
    }

    pub fn status(&self, run_id: &str) -> Option<RunState> {
        lock(&self.runs)
            .get(run_id)
            .map(|entry| *entry.state.borrow())
    }

    /// Requests cancellation. Returns false for unknown or already finished runs.
    pub fn cancel(&self, run_id: &str) -> bool {
        let runs = lock(&self.runs);
        match runs.get(run_id) {
            Some(entry) if !entry.state.borrow().is_finished() => {
                info!("Cancelling run {}", run_id);
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Waits for the run to finish and returns its final context. `None` when the id
    /// is unknown or the run's task ended without reporting.
    pub async fn wait(&self, run_id: &str) -> Option<ExecutionContext> {
        let mut state = lock(&self.runs).get(run_id)?.state.clone();
        state.wait_for(RunState::is_finished).await.ok()?;
        self.context(run_id)
    }

    /// Final context of a finished run.
    pub fn context(&self, run_id: &str) -> Option<ExecutionContext> {
        lock(&self.runs)
            .get(run_id)
            .and_then(|entry| entry.context.clone())
    }

    pub fn list(&self) -> Vec<RunInfo> {
        lock(&self.runs)
            .iter()
            .map(|(run_id, entry)| RunInfo {
                run_id: run_id.clone(),
                sequence_name: entry.sequence_name.clone(),
                state: *entry.state.borrow(),
            })
            .collect()
    }

    /// Drops a finished run and hands back its final context. Queued and running runs
    /// stay in the table and yield `None`.
    pub fn remove(&self, run_id: &str) -> Option<ExecutionContext> {
        let mut runs = lock(&self.runs);
        if !runs.get(run_id)?.state.borrow().is_finished() {
            return None;
        }
        debug!("Removing finished run {}", run_id);
        runs.shift_remove(run_id)?.context
    }

    /// Drops every finished run and returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut runs = lock(&self.runs);
        let before = runs.len();
        runs.retain(|_, entry| !entry.state.borrow().is_finished());
        let removed = before - runs.len();
        if removed > 0 {
            debug!("Pruned {} finished runs", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        lock(&self.runs).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.runs).is_empty()
    }

        pub fn running_count(&self) -> usize {
        lock(&self.runs)
            .values()
            .filter(|entry| *entry.state.borrow() == RunState::Running)
            .count()
    }
}

fn lock(runs: &RunTable) -> MutexGuard<'_, IndexMap<String, RunEntry>> {
    runs.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::Result;
    use crate::engine::StepExecutionResult;
    use crate::model::{StepKind, TaskSequenceStep};
    use crate::steps::StepExecutor;
    use async_trait::async_trait;

    struct WaitForCancel;

    #[async_trait]
    impl StepExecutor for WaitForCancel {
        fn supported_kind(&self) -> StepKind {
            StepKind::Custom
        }

        async fn execute(
            &self,
            step: &TaskSequenceStep,
            _context: &ExecutionContext,
            cancel: &CancellationToken,
        ) -> Result<StepExecutionResult> {
            cancel.cancelled().await;
            Ok(StepExecutionResult::start(step).failed("cancelled"))
        }
    }

    fn set_sequence(name: &str) -> TaskSequence {
        TaskSequence::new(name).with_step(
            TaskSequenceStep::new("Set", StepKind::SetVariable)
                .with_property("VariableName", "Run")
                .with_property("VariableValue", name),
        )
    }

    #[tokio::test]
    async fn test_runs_complete_and_are_listed() {
        let queue = RunQueue::new(Arc::new(StepRegistry::with_defaults()), 2);
        let first = queue.submit(set_sequence("First"), RunMode::Sequential);
        let second = queue.submit(
            set_sequence("Second"),
            RunMode::Parallel { max_parallelism: 2 },
        );

        let first_ctx = queue.wait(&first).await.unwrap();
        let second_ctx = queue.wait(&second).await.unwrap();

        assert_eq!(first_ctx.status, ExecutionStatus::Completed);
        assert_eq!(second_ctx.task_sequence_name, "Second");
        assert_eq!(
            queue.status(&first),
            Some(RunState::Finished(ExecutionStatus::Completed))
        );
        assert_eq!(queue.list().len(), 2);
        assert_eq!(queue.running_count(), 0);
        assert!(!queue.cancel(&first));
    }

    #[tokio::test]
    async fn test_cancel_queued_and_running_runs() {
        let mut registry = StepRegistry::new();
        registry.register(WaitForCancel);
        let queue = RunQueue::new(Arc::new(registry), 1);

        let blocking = TaskSequence::new("Blocking")
            .with_step(TaskSequenceStep::new("Wait", StepKind::Custom));
        let running = queue.submit(blocking, RunMode::Sequential);
        let queued = queue.submit(set_sequence("Queued"), RunMode::Sequential);

        assert_eq!(queue.status(&queued), Some(RunState::Queued));
        assert!(queue.cancel(&queued));
        let queued_ctx = queue.wait(&queued).await.unwrap();
        assert_eq!(queued_ctx.status, ExecutionStatus::Cancelled);
        assert!(queued_ctx.step_results.is_empty());

        assert!(queue.cancel(&running));
        let running_ctx = queue.wait(&running).await.unwrap();
        assert!(running_ctx.status.is_terminal());
    }

    #[tokio::test]
    async fn test_finished_runs_can_be_removed() {
        let queue = RunQueue::new(Arc::new(StepRegistry::with_defaults()), 2);
        let first = queue.submit(set_sequence("First"), RunMode::Sequential);
        queue.wait(&first).await.unwrap();

        let removed = queue.remove(&first).unwrap();
        assert_eq!(removed.task_sequence_name, "First");
        assert_eq!(queue.status(&first), None);
        assert!(queue.remove(&first).is_none());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_unfinished_runs() {
        let mut registry = StepRegistry::with_defaults();
        registry.register(WaitForCancel);
        let queue = RunQueue::new(Arc::new(registry), 2);

        let done = queue.submit(set_sequence("Done"), RunMode::Sequential);
        queue.wait(&done).await.unwrap();
        let blocking = TaskSequence::new("Blocking")
            .with_step(TaskSequenceStep::new("Wait", StepKind::Custom));
        let blocking = queue.submit(blocking, RunMode::Sequential);

        assert!(queue.remove(&blocking).is_none());
        assert_eq!(queue.prune_finished(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.list()[0].run_id, blocking);

        assert!(queue.cancel(&blocking));
        queue.wait(&blocking).await.unwrap();
        assert_eq!(queue.prune_finished(), 1);
        assert!(queue.is_empty());
    }

        #[tokio::test]
    async fn test_unknown_run_id() {
        let queue = RunQueue::new(Arc::new(StepRegistry::with_defaults()), 1);
        assert_eq!(queue.status("missing"), None);
        assert!(!queue.cancel("missing"));
        assert!(queue.wait("missing").await.is_none());
    }
}
