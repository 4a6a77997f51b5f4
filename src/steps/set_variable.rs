// ABOUTME: Set Variable step executor
// ABOUTME: Writes an expanded value to the variable store and echoes it as an output variable

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{expanded_property, StepExecutor};
use crate::engine::error::Result;
use crate::engine::{ExecutionContext, StepExecutionResult};
use crate::model::{StepKind, TaskSequenceStep};

/// Properties: `VariableName` (required) and `VariableValue`. Both are expanded.
pub struct SetVariableExecutor;

#[async_trait]
impl StepExecutor for SetVariableExecutor {
    fn supported_kind(&self) -> StepKind {
        StepKind::SetVariable
    }

    async fn execute(
        &self,
        step: &TaskSequenceStep,
        context: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<StepExecutionResult> {
        let mut result = StepExecutionResult::start(step);

        let name = match expanded_property(step, context, "VariableName") {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                error!("Step '{}' has no VariableName", step.name);
                return Ok(result.failed("VariableName property is required"));
            }
        };
        let value = expanded_property(step, context, "VariableValue").unwrap_or_default();

        context.variable_store().set(&name, value.clone())?;
        info!("Set variable {}", name);

        result.add_output(name, value);
        Ok(result.completed())
    }
}
