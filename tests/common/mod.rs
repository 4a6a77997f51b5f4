// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides sequence builders, scripted mock executors, and reporters for engine tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use taskseq::engine::{
    ExecutionContext, ExecutionError, ProgressReporter, Result, StepExecutionResult,
};
use taskseq::model::{StepKind, TaskSequence, TaskSequenceStep, TaskSequenceVariable};
use taskseq::steps::{StepExecutor, StepRegistry};

/// What a scripted step does, read from its `Outcome` property.
pub const OUTCOME: &str = "Outcome";

/// Handles `Custom` steps according to their `Outcome` property:
/// `fail`, `error`, `panic`, `slow` (honours `DelayMs` and cancellation), or success.
/// Every invocation is recorded by step name.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    fn supported_kind(&self) -> StepKind {
        StepKind::Custom
    }

    async fn execute(
        &self,
        step: &TaskSequenceStep,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        self.calls.lock().unwrap().push(step.name.clone());
        let mut result = StepExecutionResult::start(step);

        match step.property(OUTCOME).unwrap_or("succeed") {
            "fail" => Ok(result.failed(format!("{} failed on purpose", step.name))),
            "error" => Err(ExecutionError::ExecutorFailure {
                step: step.name.clone(),
                message: "scripted error".to_string(),
            }),
            "panic" => panic!("scripted panic in {}", step.name),
            "slow" => {
                let delay = step
                    .property("DelayMs")
                    .and_then(|ms| ms.parse().ok())
                    .unwrap_or(50);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => Ok(result.completed()),
                    _ = cancel.cancelled() => Ok(result.failed("cancelled")),
                }
            }
            _ => {
                if let Some(message) = step.property("Echo") {
                    result.add_output("Echo", context.expand(message));
                }
                Ok(result.completed())
            }
        }
    }
}

/// Registry with the built-in executors plus a scripted executor for `Custom` steps.
pub fn scripted_registry() -> (StepRegistry, ScriptedExecutor) {
    let scripted = ScriptedExecutor::new();
    let mut registry = StepRegistry::with_defaults();
    registry.register(scripted.clone());
    (registry, scripted)
}

pub fn scripted_step(name: &str) -> TaskSequenceStep {
    TaskSequenceStep::new(name, StepKind::Custom)
}

pub fn failing_step(name: &str) -> TaskSequenceStep {
    scripted_step(name).with_property(OUTCOME, "fail")
}

pub fn set_variable_step(name: &str, variable: &str, value: &str) -> TaskSequenceStep {
    TaskSequenceStep::new(name, StepKind::SetVariable)
        .with_property("VariableName", variable)
        .with_property("VariableValue", value)
}

#[derive(Default)]
pub struct RecordingReporter {
    pub steps: Mutex<Vec<String>>,
    pub progress_calls: Mutex<usize>,
}

#[async_trait]
impl ProgressReporter for RecordingReporter {
    async fn report_step(&self, result: &StepExecutionResult) -> anyhow::Result<()> {
        self.steps.lock().unwrap().push(result.step_name.clone());
        Ok(())
    }

    async fn report_progress(&self, _context: &ExecutionContext) -> anyhow::Result<()> {
        *self.progress_calls.lock().unwrap() += 1;
        Ok(())
    }
}

pub struct BrokenReporter;

#[async_trait]
impl ProgressReporter for BrokenReporter {
    async fn report_step(&self, _result: &StepExecutionResult) -> anyhow::Result<()> {
        anyhow::bail!("reporting sink unavailable")
    }

    async fn report_progress(&self, _context: &ExecutionContext) -> anyhow::Result<()> {
        anyhow::bail!("reporting sink unavailable")
    }
}

/// A sequence exercising every field the document codecs carry: nested groups two
/// levels deep, conditions, and property keys that differ only by case.
pub fn sample_sequence() -> TaskSequence {
    use taskseq::model::{ConditionOperator, TaskSequenceCondition};

    let mut sequence = TaskSequence::new("Windows 11 Deployment")
        .with_variable(TaskSequenceVariable::new("OSDComputerName", "LAB-01"))
        .with_variable(TaskSequenceVariable::new("Domain", "corp.example.com").read_only())
        .with_variable(TaskSequenceVariable::new("JoinPassword", "s3cret").secret())
        .with_step(
            TaskSequenceStep::new("Partition Disk", StepKind::FormatAndPartition)
                .with_id("step-format")
                .with_property("DiskNumber", "0")
                .with_property("PartitionStyle", "GPT"),
        )
        .with_step(
            TaskSequenceStep::group("Install Operating System")
                .with_id("group-os")
                .continue_on_error(true)
                .with_condition(TaskSequenceCondition::new(
                    "OSDComputerName",
                    ConditionOperator::NotEquals,
                    "",
                ))
                .with_child(
                    TaskSequenceStep::new("Apply Image", StepKind::ApplyWindowsImage)
                        .with_id("step-apply")
                        .with_property("WimPath", "\\\\server\\images\\install.wim")
                        .with_property("ImageIndex", "3")
                        .with_property("TargetDrive", "C:"),
                )
                .with_child(
                    TaskSequenceStep::group("Drivers")
                        .with_id("group-drivers")
                        .with_child(
                            TaskSequenceStep::new("Install Drivers", StepKind::InstallDriver)
                                .with_id("step-drivers")
                                .enabled(false)
                                .with_property("DriverPath", "D:\\Drivers")
                                .with_property("driverpath", "lowercase twin")
                                .with_condition(TaskSequenceCondition::new(
                                    "Memory",
                                    ConditionOperator::GreaterThan,
                                    "4",
                                )),
                        ),
                ),
        )
        .with_step(
            TaskSequenceStep::new("Run Setup", StepKind::RunCommandLine)
                .with_id("step-cmd")
                .with_property("CommandLine", "setup.exe /quiet /name:%OSDComputerName%")
                .with_property("SuccessCodes", "0 3010"),
        );
    sequence.id = "ts-win11".to_string();
    sequence.version = "2.4.0".to_string();
    sequence.description = "Lab build & capture <test>".to_string();
    sequence
}

pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }
}
