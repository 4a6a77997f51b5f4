// ABOUTME: Progress reporting sink notified as a task sequence run advances
// ABOUTME: Provides the reporter trait and a tracing-backed default implementation

use async_trait::async_trait;
use tracing::{info, warn};

use super::context::ExecutionContext;
use super::result::{ExecutionStatus, StepExecutionResult};

/// Receives step results as they are recorded and run-level progress after each
/// top-level step. Errors are logged by the engine and otherwise ignored.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report_step(&self, result: &StepExecutionResult) -> anyhow::Result<()>;

    async fn report_progress(&self, context: &ExecutionContext) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

#[async_trait]
impl ProgressReporter for LogReporter {
    async fn report_step(&self, result: &StepExecutionResult) -> anyhow::Result<()> {
        match result.status {
            ExecutionStatus::Failed => warn!(
                "Step '{}' failed: {}",
                result.step_name,
                result.error_message.as_deref().unwrap_or("no error message")
            ),
            status => info!("Step '{}' finished: {}", result.step_name, status),
        }
        Ok(())
    }

    async fn report_progress(&self, context: &ExecutionContext) -> anyhow::Result<()> {
        let summary = context.summary();
        info!(
            "Run {} is {}: {} step result(s), {} failed",
            context.execution_id, context.status, summary.total_steps, summary.failed_steps
        );
        Ok(())
    }
}
