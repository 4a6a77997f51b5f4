// ABOUTME: Restart Computer step executor
// ABOUTME: Records a restart request for the host to act on after the step completes

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{expanded_property, parsed_property, StepExecutor};
use crate::engine::error::Result;
use crate::engine::{ExecutionContext, StepExecutionResult};
use crate::model::{StepKind, TaskSequenceStep};
use crate::variables::builtin;

const DEFAULT_DELAY_SECONDS: u32 = 5;
const DEFAULT_MESSAGE: &str = "The computer will restart";

/// Properties: `DelaySeconds` (default 5) and `Message`. Sets `_SMSTSRebootRequested`
/// and outputs `RestartScheduled`, `RestartDelaySeconds`, and `RestartMessage`.
/// The restart itself is left to the host.
pub struct RestartComputerExecutor;

#[async_trait]
impl StepExecutor for RestartComputerExecutor {
    fn supported_kind(&self) -> StepKind {
        StepKind::RestartComputer
    }

    async fn execute(
        &self,
        step: &TaskSequenceStep,
        context: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let mut result = StepExecutionResult::start(step);

        let delay: u32 = parsed_property(step, context, "DelaySeconds", DEFAULT_DELAY_SECONDS)?;
        let message = expanded_property(step, context, "Message")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        context
            .variable_store()
            .set(builtin::REBOOT_REQUESTED, "true")?;
        info!("Restart requested in {} seconds: {}", delay, message);

        result.add_output("RestartScheduled", "true");
        result.add_output("RestartDelaySeconds", delay.to_string());
        result.add_output("RestartMessage", message);
        Ok(result.completed())
    }
}
