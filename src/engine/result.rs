// ABOUTME: Step result and run status types for task sequence execution
// ABOUTME: Tracks per-step timing, failure messages, and output variables

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::TaskSequenceStep;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ExecutionStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepExecutionResult {
    pub step_id: String,
    pub step_name: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub output_variables: IndexMap<String, String>,
}

impl StepExecutionResult {
    /// A running result for `step`, stamped with the current time.
    pub fn start(step: &TaskSequenceStep) -> Self {
        Self {
            step_id: step.id.clone(),
            step_name: step.name.clone(),
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            error_message: None,
            output_variables: IndexMap::new(),
        }
    }

    pub fn mark_completed(&mut self, status: ExecutionStatus, error: Option<String>) {
        self.status = status;
        self.end_time = Some(Utc::now());
        self.error_message = error;
    }

    pub fn completed(mut self) -> Self {
        self.mark_completed(ExecutionStatus::Completed, None);
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.mark_completed(ExecutionStatus::Failed, Some(message.into()));
        self
    }

    pub fn add_output(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.output_variables.insert(key.into(), value.into());
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecutionStatus::Failed
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end_time
            .map(|end| (end - self.start_time).to_std().unwrap_or(Duration::ZERO))
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::NotStarted => write!(f, "not_started"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}
