// ABOUTME: Variable storage shared across a task sequence run
// ABOUTME: Exports the case-insensitive store, its error, and the built-in variable names

pub mod error;
pub mod store;

pub use error::ReadOnlyVariableError;
pub use store::VariableStore;

/// Names of the variables the engine publishes before any declared variable.
pub mod builtin {
    pub const TASK_SEQUENCE_ID: &str = "TaskSequenceID";
    pub const TASK_SEQUENCE_NAME: &str = "TaskSequenceName";
    pub const TASK_SEQUENCE_VERSION: &str = "TaskSequenceVersion";
    pub const MACHINE_NAME: &str = "_SMSTSMachineName";
    pub const REBOOT_REQUESTED: &str = "_SMSTSRebootRequested";
}
