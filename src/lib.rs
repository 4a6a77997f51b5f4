// ABOUTME: Main library module for the taskseq task sequence engine
// ABOUTME: Exports all core modules and provides the public API

pub mod cli;
pub mod engine;
pub mod model;
pub mod parser;
pub mod steps;
pub mod variables;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use engine::{
    ExecutionContext, ExecutionStatus, RunQueue, StepExecutionResult, TaskSequenceEngine,
};
pub use model::{
    ConditionOperator, StepKind, TaskSequence, TaskSequenceCondition, TaskSequenceStep,
    TaskSequenceVariable,
};
pub use parser::{Format, FormatError, ParserRegistry, SequenceValidator};
pub use steps::{StepExecutor, StepRegistry};
pub use variables::{ReadOnlyVariableError, VariableStore};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
