// ABOUTME: Top-level task sequence document and its declared variables
// ABOUTME: Supplies defaults for identity, version, and timestamps when documents omit them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::TaskSequenceStep;

pub const DEFAULT_SEQUENCE_NAME: &str = "Unnamed Task Sequence";
pub const DEFAULT_SEQUENCE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSequence {
    #[serde(default = "super::new_id")]
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub created_date: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_date: DateTime<Utc>,
    #[serde(default)]
    pub variables: Vec<TaskSequenceVariable>,
    #[serde(default)]
    pub steps: Vec<TaskSequenceStep>,
}

fn default_name() -> String {
    DEFAULT_SEQUENCE_NAME.to_string()
}

fn default_version() -> String {
    DEFAULT_SEQUENCE_VERSION.to_string()
}

impl TaskSequence {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            name: name.into(),
            description: String::new(),
            version: default_version(),
            created_date: now,
            modified_date: now,
            variables: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_variable(mut self, variable: TaskSequenceVariable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_step(mut self, step: TaskSequenceStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Total number of steps in the tree, groups included.
    pub fn step_count(&self) -> usize {
        self.steps.iter().map(TaskSequenceStep::step_count).sum()
    }

    pub fn find_step(&self, id: &str) -> Option<&TaskSequenceStep> {
        self.steps.iter().find_map(|step| step.find(id))
    }
}

impl Default for TaskSequence {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_NAME)
    }
}

/// A variable declared by the document and published when execution starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSequenceVariable {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, alias = "readOnly", alias = "readonly")]
    pub is_read_only: bool,
    /// Display hint only; the value is still stored and expanded normally.
    #[serde(default, alias = "secret")]
    pub is_secret: bool,
}

impl TaskSequenceVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_read_only: false,
            is_secret: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.is_read_only = true;
        self
    }

    pub fn secret(mut self) -> Self {
        self.is_secret = true;
        self
    }

    /// Value suitable for logs and reports.
    pub fn display_value(&self) -> &str {
        if self.is_secret {
            "********"
        } else {
            &self.value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepKind;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let seq: TaskSequence = serde_json::from_str(r#"{"steps": []}"#).unwrap();
        assert_eq!(seq.name, DEFAULT_SEQUENCE_NAME);
        assert_eq!(seq.version, DEFAULT_SEQUENCE_VERSION);
        assert!(!seq.id.is_empty());
        assert!(seq.variables.is_empty());
    }

    #[test]
    fn test_variable_flag_aliases() {
        let var: TaskSequenceVariable =
            serde_yaml::from_str("name: Pwd\nvalue: hunter2\nsecret: true\nreadonly: true\n")
                .unwrap();
        assert!(var.is_secret);
        assert!(var.is_read_only);
        assert_eq!(var.display_value(), "********");
    }

    #[test]
    fn test_step_count_spans_nested_groups() {
        let seq = TaskSequence::new("Deploy")
            .with_step(TaskSequenceStep::new("One", StepKind::SetVariable))
            .with_step(
                TaskSequenceStep::group("Group")
                    .with_child(TaskSequenceStep::new("Two", StepKind::RunCommandLine).with_id("two")),
            );
        assert_eq!(seq.step_count(), 3);
        assert!(seq.find_step("two").is_some());
    }
}
