// ABOUTME: Error types for task sequence execution
// ABOUTME: Covers dispatch failures, executor errors, and protected variable writes

use thiserror::Error;

use crate::model::StepKind;
use crate::variables::ReadOnlyVariableError;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No executor found for step type: {kind}")]
    NoExecutorFound { kind: StepKind },

    #[error("Step '{step}' failed: {message}")]
    ExecutorFailure { step: String, message: String },

    #[error("Executor for step '{step}' panicked: {message}")]
    ExecutorPanicked { step: String, message: String },

    #[error(transparent)]
    ReadOnlyVariable(#[from] ReadOnlyVariableError),

    #[error("Invalid property '{property}' on step '{step}': {reason}")]
    InvalidProperty {
        step: String,
        property: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
