// ABOUTME: Parallel execution mode for task sequences
// ABOUTME: Runs top-level step subtrees concurrently under a semaphore bound and merges their results

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::context::ExecutionContext;
use super::executor::TaskSequenceEngine;
use super::result::{ExecutionStatus, StepExecutionResult};
use crate::model::TaskSequence;

impl TaskSequenceEngine {
    /// Runs every top-level step as its own branch, at most `max_parallelism` at a time.
    ///
    /// A failed branch does not stop its siblings. Once `cancel` fires, branches that
    /// have not started are skipped while running ones continue to their own
    /// cancellation checks. Results are ordered by start time.
    #[instrument(skip_all, fields(sequence = %sequence.name, mode = "parallel", max_parallelism = max_parallelism))]
    pub async fn execute_parallel(
        &self,
        sequence: &TaskSequence,
        max_parallelism: usize,
        cancel: CancellationToken,
    ) -> ExecutionContext {
        let mut context = match self.begin(sequence) {
            Ok(context) => context,
            Err(context) => return self.end(context).await,
        };

        let max_parallelism = max_parallelism.max(1);
        let semaphore = Arc::new(Semaphore::new(max_parallelism));
        let runner = self.runner();

        info!(
            "Launching {} branch(es) with max parallelism {}",
            sequence.steps.len(),
            max_parallelism
        );

        let handles = sequence.steps.iter().map(|step| {
            let step = step.clone();
            let runner = runner.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let mut branch = context.branch();

            tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return None;
                };

                debug!("Starting branch: {}", step.name);
                let result = runner.run_step(&step, &mut branch, &cancel).await;
                runner.record(&mut branch, result).await;
                Some(branch.step_results)
            })
        });
        let steps: Vec<_> = sequence.steps.iter().collect();

        let mut results: Vec<StepExecutionResult> = Vec::new();
        let mut skipped = 0;
        for (outcome, step) in join_all(handles).await.into_iter().zip(steps) {
            match outcome {
                Ok(Some(branch_results)) => results.extend(branch_results),
                Ok(None) => {
                    warn!("Cancellation requested; branch '{}' was not started", step.name);
                    skipped += 1;
                }
                Err(e) => {
                    error!("Branch '{}' did not finish: {}", step.name, e);
                    results.push(StepExecutionResult::start(step).failed(format!(
                        "Branch did not finish: {}",
                        e
                    )));
                }
            }
        }

        results.sort_by_key(|result| result.start_time);
        for result in results {
            context.record(result);
        }

        let status = if context.has_failures() {
            ExecutionStatus::Failed
        } else if skipped > 0 {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Completed
        };
        context.finish(status);
        self.end(context).await
    }
}
