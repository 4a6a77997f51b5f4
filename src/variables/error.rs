// ABOUTME: Error raised when code tries to overwrite a protected variable
// ABOUTME: Carries the variable name exactly as the caller spelled it

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Variable '{name}' is read-only and cannot be modified")]
pub struct ReadOnlyVariableError {
    pub name: String,
}
