// ABOUTME: Error types for task sequence parsing and validation
// ABOUTME: Defines format errors raised by codecs and findings raised by the validator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Failed to read task sequence file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid document root: {0}")]
    InvalidRoot(String),

    #[error("Invalid value '{value}' for {field}")]
    InvalidValue { field: String, value: String },

    #[error("Unknown condition operator: '{0}'")]
    UnknownOperator(String),

    #[error("Missing required attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("No registered parser recognizes this document")]
    UnrecognizedFormat,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Duplicate variable name: {name}")]
    DuplicateVariable { name: String },

    #[error("Duplicate step id '{id}' (step '{step}')")]
    DuplicateStepId { id: String, step: String },

    #[error("Step '{id}' has no name")]
    EmptyStepName { id: String },

    #[error("Step '{step}' has a condition with no variable name")]
    EmptyConditionVariable { step: String },

    #[error("Variable declared with an empty name")]
    EmptyVariableName,
}

pub type Result<T> = std::result::Result<T, FormatError>;
