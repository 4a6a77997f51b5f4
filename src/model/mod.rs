// ABOUTME: Task sequence document model shared by parsers, engine, and executors
// ABOUTME: Exports the sequence, variable, step, and condition types

pub mod condition;
pub mod sequence;
pub mod step;

pub use condition::{ConditionOperator, TaskSequenceCondition};
pub use sequence::{TaskSequence, TaskSequenceVariable};
pub use step::{StepKind, TaskSequenceStep};

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
