// ABOUTME: Run Command Line step executor
// ABOUTME: Runs the expanded CommandLine property through the platform shell

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::process::{self, ProcessSpec};
use super::{expanded_property, StepExecutor};
use crate::engine::error::Result;
use crate::engine::{ExecutionContext, StepExecutionResult};
use crate::model::{StepKind, TaskSequenceStep};

/// Properties: `CommandLine` (required), `WorkingDirectory`, `Timeout` in seconds
/// (default 3600), `SuccessCodes` (default "0"). Outputs `ExitCode` and `Output`.
pub struct RunCommandLineExecutor;

#[cfg(windows)]
fn shell_invocation(command_line: &str) -> (String, Vec<String>) {
    ("cmd".to_string(), vec!["/C".to_string(), command_line.to_string()])
}

#[cfg(not(windows))]
fn shell_invocation(command_line: &str) -> (String, Vec<String>) {
    ("sh".to_string(), vec!["-c".to_string(), command_line.to_string()])
}

#[async_trait]
impl StepExecutor for RunCommandLineExecutor {
    fn supported_kind(&self) -> StepKind {
        StepKind::RunCommandLine
    }

    async fn execute(
        &self,
        step: &TaskSequenceStep,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let result = StepExecutionResult::start(step);

        let command_line = match expanded_property(step, context, "CommandLine") {
            Some(line) if !line.trim().is_empty() => line,
            _ => {
                error!("Step '{}' has no CommandLine", step.name);
                return Ok(result.failed("CommandLine property is required"));
            }
        };

        info!("Running command line for step '{}'", step.name);

        let (program, args) = shell_invocation(&command_line);
        let spec = ProcessSpec::from_step(step, context, program, args)?;
        process::run(spec, cancel, result).await
    }
}
