// ABOUTME: Step executor contract, registry, and built-in executors
// ABOUTME: Resolves each step to the first registered executor that claims it

pub mod command;
pub mod powershell;
mod process;
pub mod restart;
pub mod set_variable;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::engine::error::{ExecutionError, Result};
use crate::engine::{ExecutionContext, StepExecutionResult};
use crate::model::{StepKind, TaskSequenceStep};

pub use command::RunCommandLineExecutor;
pub use powershell::RunPowerShellExecutor;
pub use restart::RestartComputerExecutor;
pub use set_variable::SetVariableExecutor;

/// Performs the work of one step kind.
///
/// Implementations should turn ordinary failures into a `Failed` result, stop promptly
/// once `cancel` fires, and expand `%NAME%` references in property values before use.
/// An `Err` or a panic is converted into a `Failed` result by the engine.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn supported_kind(&self) -> StepKind;

    fn can_execute(&self, step: &TaskSequenceStep) -> bool {
        step.kind == self.supported_kind()
    }

    async fn execute(
        &self,
        step: &TaskSequenceStep,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult>;
}

/// Ordered executors; earlier registrations win.
pub struct StepRegistry {
    executors: Vec<Arc<dyn StepExecutor>>,
}

impl StepRegistry {
    /// Registry with no executors.
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    /// Registry with all built-in executors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(SetVariableExecutor);
        registry.register(RunCommandLineExecutor);
        registry.register(RunPowerShellExecutor);
        registry.register(RestartComputerExecutor);

        registry
    }

    pub fn register<E: StepExecutor + 'static>(&mut self, executor: E) {
        self.executors.push(Arc::new(executor));
    }

    pub fn register_shared(&mut self, executor: Arc<dyn StepExecutor>) {
        self.executors.push(executor);
    }

    pub fn resolve(&self, step: &TaskSequenceStep) -> Option<Arc<dyn StepExecutor>> {
        self.executors
            .iter()
            .find(|executor| executor.can_execute(step))
            .cloned()
    }

    pub fn supports(&self, step: &TaskSequenceStep) -> bool {
        self.executors.iter().any(|executor| executor.can_execute(step))
    }

    pub fn supported_kinds(&self) -> Vec<StepKind> {
        let mut kinds = Vec::new();
        for executor in &self.executors {
            let kind = executor.supported_kind();
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Property value with `%NAME%` references expanded, or `None` when absent.
pub(crate) fn expanded_property(
    step: &TaskSequenceStep,
    context: &ExecutionContext,
    key: &str,
) -> Option<String> {
    step.property(key).map(|value| context.expand(value))
}

/// Expanded, trimmed property parsed as `T`, falling back to `default` when the
/// property is absent or blank.
pub(crate) fn parsed_property<T: std::str::FromStr>(
    step: &TaskSequenceStep,
    context: &ExecutionContext,
    key: &str,
    default: T,
) -> Result<T> {
    match expanded_property(step, context, key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ExecutionError::InvalidProperty {
                    step: step.name.clone(),
                    property: key.to_string(),
                    reason: format!("'{}' is not a valid value", raw),
                })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedExecutor {
        name: &'static str,
    }

    #[async_trait]
    impl StepExecutor for NamedExecutor {
        fn supported_kind(&self) -> StepKind {
            StepKind::Custom
        }

        fn can_execute(&self, step: &TaskSequenceStep) -> bool {
            step.kind == StepKind::Custom && step.name == self.name
        }

        async fn execute(
            &self,
            step: &TaskSequenceStep,
            _context: &ExecutionContext,
            _cancel: &CancellationToken,
        ) -> Result<StepExecutionResult> {
            Ok(StepExecutionResult::start(step).completed())
        }
    }

    #[test]
    fn test_builtin_registrations() {
        let registry = StepRegistry::with_defaults();
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.supported_kinds(),
            vec![
                StepKind::SetVariable,
                StepKind::RunCommandLine,
                StepKind::RunPowerShell,
                StepKind::RestartComputer
            ]
        );
        assert!(registry.supports(&TaskSequenceStep::new("x", StepKind::SetVariable)));
        assert!(!registry.supports(&TaskSequenceStep::new("x", StepKind::ApplyWindowsImage)));
        assert!(StepRegistry::new().is_empty());
        assert_eq!(StepRegistry::default().len(), 4);
    }

    #[test]
    fn test_custom_executor_can_match_by_name() {
        let mut registry = StepRegistry::new();
        registry.register(NamedExecutor { name: "Flash BIOS" });

        assert!(registry
            .resolve(&TaskSequenceStep::new("Flash BIOS", StepKind::Custom))
            .is_some());
        assert!(registry
            .resolve(&TaskSequenceStep::new("Other", StepKind::Custom))
            .is_none());
    }
}
