// ABOUTME: Run PowerShell step executor
// ABOUTME: Writes the expanded script to a temporary .ps1 file and runs it with the interpreter

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::process::{self, ProcessSpec};
use super::{expanded_property, StepExecutor};
use crate::engine::error::Result;
use crate::engine::{ExecutionContext, StepExecutionResult};
use crate::model::{StepKind, TaskSequenceStep};

const DEFAULT_INTERPRETER: &str = "pwsh";

/// Properties: `Script` (inline, required unless `ScriptPath` is set), `ScriptPath`,
/// `Interpreter` (default `pwsh`), plus the shared `WorkingDirectory`, `Timeout`, and
/// `SuccessCodes`. Outputs `ExitCode`, `Output`, and `ScriptExecuted`.
pub struct RunPowerShellExecutor;

/// Matches on the file name alone. Documents may carry Windows paths, so both
/// separators count regardless of the host.
fn is_powershell(interpreter: &str) -> bool {
    let file_name = interpreter
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(interpreter)
        .to_ascii_lowercase();
    let stem = file_name.strip_suffix(".exe").unwrap_or(&file_name);
    stem == "pwsh" || stem == "powershell"
}

fn interpreter_args(interpreter: &str, script: &Path) -> Vec<String> {
    let mut args = Vec::new();
    if is_powershell(interpreter) {
        args.extend(
            ["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-File"]
                .iter()
                .map(|arg| arg.to_string()),
        );
    }
    args.push(script.to_string_lossy().into_owned());
    args
}

#[async_trait]
impl StepExecutor for RunPowerShellExecutor {
    fn supported_kind(&self) -> StepKind {
        StepKind::RunPowerShell
    }

    async fn execute(
        &self,
        step: &TaskSequenceStep,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let result = StepExecutionResult::start(step);

        let interpreter = expanded_property(step, context, "Interpreter")
            .filter(|i| !i.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string());

        let script = expanded_property(step, context, "Script")
            .or_else(|| expanded_property(step, context, "ScriptContent"))
            .filter(|s| !s.trim().is_empty());
        let script_path = expanded_property(step, context, "ScriptPath")
            .filter(|p| !p.trim().is_empty());

        // The temp file must outlive the process.
        let (path, _script_file) = match (script, script_path) {
            (Some(script), _) => {
                let mut file = tempfile::Builder::new()
                    .prefix("taskseq-")
                    .suffix(".ps1")
                    .tempfile()?;
                file.write_all(script.as_bytes())?;
                file.flush()?;
                debug!("Wrote {} byte script to {}", script.len(), file.path().display());
                (file.path().to_path_buf(), Some(file))
            }
            (None, Some(path)) => (PathBuf::from(path), None),
            (None, None) => {
                error!("Step '{}' has no Script", step.name);
                return Ok(result.failed("Script property is required"));
            }
        };

        info!("Running PowerShell script for step '{}' with {}", step.name, interpreter);

        let args = interpreter_args(&interpreter, &path);
        let spec = ProcessSpec::from_step(step, context, interpreter, args)?;
        let mut result = process::run(spec, cancel, result).await?;
        if !result.is_failed() {
            result.add_output("ScriptExecuted", "true");
        }
        Ok(result)
    }
}
