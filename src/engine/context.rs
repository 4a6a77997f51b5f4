// ABOUTME: Per-run execution context for task sequences
// ABOUTME: Holds run status, timestamps, recorded step results, and a handle to the variable store

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::result::{ExecutionStatus, StepExecutionResult};
use crate::model::TaskSequence;
use crate::variables::VariableStore;

/// Created at the start of a run and handed back when the run ends. Step results are
/// append-only while the run is in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub execution_id: String,
    pub task_sequence_id: String,
    pub task_sequence_name: String,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Declared variables as published at the start of the run.
    pub variables: IndexMap<String, String>,
    pub current_step_id: Option<String>,
    pub step_results: Vec<StepExecutionResult>,
    #[serde(skip)]
    store: Arc<VariableStore>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub cancelled_steps: usize,
}

impl ExecutionContext {
    pub fn new(sequence: &TaskSequence, store: Arc<VariableStore>) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            task_sequence_id: sequence.id.clone(),
            task_sequence_name: sequence.name.clone(),
            status: ExecutionStatus::NotStarted,
            start_time: None,
            end_time: None,
            variables: IndexMap::new(),
            current_step_id: None,
            step_results: Vec::new(),
            store,
        }
    }

    /// Context for one parallel branch: same run identity and store, no results yet.
    pub fn branch(&self) -> Self {
        Self {
            execution_id: self.execution_id.clone(),
            task_sequence_id: self.task_sequence_id.clone(),
            task_sequence_name: self.task_sequence_name.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: None,
            variables: self.variables.clone(),
            current_step_id: None,
            step_results: Vec::new(),
            store: Arc::clone(&self.store),
        }
    }

    pub fn mark_started(&mut self) {
        self.status = ExecutionStatus::Running;
        self.start_time = Some(Utc::now());
    }

    /// Moves a still-running context to `status` and stamps the end time. A context that
    /// already reached a terminal status keeps it.
    pub fn finish(&mut self, status: ExecutionStatus) {
        if !self.status.is_terminal() {
            self.status = status;
        }
        self.end_time = Some(Utc::now());
    }

    pub fn variable_store(&self) -> &VariableStore {
        &self.store
    }

    pub fn shared_store(&self) -> Arc<VariableStore> {
        Arc::clone(&self.store)
    }

    /// Expands `%NAME%` references against the live variable store.
    pub fn expand(&self, text: &str) -> String {
        self.store.expand(text)
    }

    pub fn record(&mut self, result: StepExecutionResult) {
        self.step_results.push(result);
    }

    pub fn result_for(&self, step_id: &str) -> Option<&StepExecutionResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }

    pub fn result_named(&self, step_name: &str) -> Option<&StepExecutionResult> {
        self.step_results.iter().find(|r| r.step_name == step_name)
    }

    pub fn has_failures(&self) -> bool {
        self.step_results.iter().any(StepExecutionResult::is_failed)
    }

    pub fn summary(&self) -> ExecutionSummary {
        let count = |status| {
            self.step_results
                .iter()
                .filter(|r| r.status == status)
                .count()
        };
        ExecutionSummary {
            total_steps: self.step_results.len(),
            completed_steps: count(ExecutionStatus::Completed),
            failed_steps: count(ExecutionStatus::Failed),
            cancelled_steps: count(ExecutionStatus::Cancelled),
        }
    }
}
