// ABOUTME: Child process runner shared by the command-line and PowerShell executors
// ABOUTME: Applies timeouts, success-code checks, and kills the child when a run is cancelled

use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{expanded_property, parsed_property};
use crate::engine::error::{ExecutionError, Result};
use crate::engine::{ExecutionContext, StepExecutionResult};
use crate::model::TaskSequenceStep;

const DEFAULT_TIMEOUT_SECONDS: u64 = 3600;

pub(crate) struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub timeout: Duration,
    pub success_codes: Vec<i32>,
}

impl ProcessSpec {
    /// Reads `WorkingDirectory`, `Timeout`, and `SuccessCodes` from the step.
    pub fn from_step(
        step: &TaskSequenceStep,
        context: &ExecutionContext,
        program: String,
        args: Vec<String>,
    ) -> Result<Self> {
        let working_dir = expanded_property(step, context, "WorkingDirectory")
            .filter(|dir| !dir.trim().is_empty());
        let timeout_seconds: u64 =
            parsed_property(step, context, "Timeout", DEFAULT_TIMEOUT_SECONDS)?;
        let success_codes = match expanded_property(step, context, "SuccessCodes") {
            Some(raw) if !raw.trim().is_empty() => parse_success_codes(step, &raw)?,
            _ => vec![0],
        };

        Ok(Self {
            program,
            args,
            working_dir,
            timeout: Duration::from_secs(timeout_seconds),
            success_codes,
        })
    }
}

fn parse_success_codes(step: &TaskSequenceStep, raw: &str) -> Result<Vec<i32>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|code| !code.is_empty())
        .map(|code| {
            code.parse::<i32>()
                .map_err(|_| ExecutionError::InvalidProperty {
                    step: step.name.clone(),
                    property: "SuccessCodes".to_string(),
                    reason: format!("'{}' is not an exit code", code),
                })
        })
        .collect()
}

/// Runs the process to completion and records `ExitCode` and `Output` on `result`.
pub(crate) async fn run(
    spec: ProcessSpec,
    cancel: &CancellationToken,
    mut result: StepExecutionResult,
) -> Result<StepExecutionResult> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref dir) = spec.working_dir {
        cmd.current_dir(dir);
    }

    debug!("Spawning {} {:?}", spec.program, spec.args);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let message = format!("Failed to start '{}': {}", spec.program, e);
            error!("{}", message);
            return Ok(result.failed(message));
        }
    };

    // Dropping the wait future on cancel or timeout drops the child, which kills it.
    let outcome = tokio::select! {
        outcome = timeout(spec.timeout, child.wait_with_output()) => outcome,
        _ = cancel.cancelled() => {
            warn!("Cancellation requested; killed '{}'", spec.program);
            return Ok(result.failed("Step cancelled before the process finished"));
        }
    };

    let output = match outcome {
        Ok(output) => output?,
        Err(_) => {
            let message = format!(
                "Process timed out after {} seconds",
                spec.timeout.as_secs()
            );
            error!("{}", message);
            result.add_output("ExitCode", "-1");
            return Ok(result.failed(message));
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    debug!("Process exited with code {}", exit_code);

    result.add_output("ExitCode", exit_code.to_string());
    if !stdout.is_empty() {
        result.add_output("Output", stdout.trim_end());
    }

    if spec.success_codes.contains(&exit_code) {
        return Ok(result.completed());
    }

    let message = if stderr.trim().is_empty() {
        format!(
            "Process exited with code {} (expected one of: {:?})",
            exit_code, spec.success_codes
        )
    } else {
        format!(
            "Process exited with code {} (expected one of: {:?}): {}",
            exit_code,
            spec.success_codes,
            stderr.trim()
        )
    };
    error!("{}", message);
    Ok(result.failed(message))
}
