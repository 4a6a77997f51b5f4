// ABOUTME: Execution engine module for task sequences
// ABOUTME: Handles sequential and parallel runs, condition evaluation, progress reporting, and run queueing

pub mod condition;
pub mod context;
pub mod error;
pub mod executor;
pub mod queue;
pub mod reporter;
pub mod result;
pub mod scheduler;

pub use condition::ConditionEvaluator;
pub use context::{ExecutionContext, ExecutionSummary};
pub use error::{ExecutionError, Result};
pub use executor::TaskSequenceEngine;
pub use queue::{RunInfo, RunMode, RunQueue, RunState};
pub use reporter::{LogReporter, ProgressReporter};
pub use result::{ExecutionStatus, StepExecutionResult};
