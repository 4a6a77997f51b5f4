// ABOUTME: Structural validation for parsed task sequences
// ABOUTME: Reports hard errors and advisory warnings without executing anything

use std::collections::HashSet;

use super::error::ValidationError;
use crate::model::{TaskSequence, TaskSequenceStep};
use crate::steps::StepRegistry;
use crate::variables::store::fold_case;

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub is_valid: bool,
}

pub struct SequenceValidator<'a> {
    step_registry: Option<&'a StepRegistry>,
}

impl<'a> SequenceValidator<'a> {
    pub fn new() -> Self {
        Self {
            step_registry: None,
        }
    }

    /// Also warn about steps no registered executor can handle.
    pub fn with_step_registry(mut self, registry: &'a StepRegistry) -> Self {
        self.step_registry = Some(registry);
        self
    }

    pub fn validate(&self, sequence: &TaskSequence) -> ValidationReport {
        let mut report = ValidationReport::new();

        self.validate_variables(sequence, &mut report);

        let mut seen_ids = HashSet::new();
        for step in &sequence.steps {
            self.validate_step(step, &mut seen_ids, &mut report);
        }

        if sequence.steps.is_empty() {
            report
                .warnings
                .push("Task sequence defines no steps".to_string());
        }

        report.is_valid = report.errors.is_empty();
        report
    }

    fn validate_variables(&self, sequence: &TaskSequence, report: &mut ValidationReport) {
        let mut seen = HashSet::new();
        for variable in &sequence.variables {
            if variable.name.trim().is_empty() {
                report.errors.push(ValidationError::EmptyVariableName);
                continue;
            }
            if !seen.insert(fold_case(&variable.name)) {
                report.errors.push(ValidationError::DuplicateVariable {
                    name: variable.name.clone(),
                });
            }
        }
    }

    fn validate_step(
        &self,
        step: &TaskSequenceStep,
        seen_ids: &mut HashSet<String>,
        report: &mut ValidationReport,
    ) {
        if !seen_ids.insert(step.id.clone()) {
            report.errors.push(ValidationError::DuplicateStepId {
                id: step.id.clone(),
                step: step.name.clone(),
            });
        }

        if step.name.trim().is_empty() {
            report
                .errors
                .push(ValidationError::EmptyStepName { id: step.id.clone() });
        }

        if step
            .conditions
            .iter()
            .any(|condition| condition.variable_name.trim().is_empty())
        {
            report.errors.push(ValidationError::EmptyConditionVariable {
                step: step.name.clone(),
            });
        }

        if !step.is_group() {
            if !step.children.is_empty() {
                report.warnings.push(format!(
                    "Step '{}' is a {} step; its {} child step(s) will never run",
                    step.name,
                    step.kind,
                    step.children.len()
                ));
            }

            for property in step.kind.required_properties() {
                if !step.properties.contains_key(*property) {
                    report.warnings.push(format!(
                        "Step '{}' ({}) is missing property '{}'",
                        step.name, step.kind, property
                    ));
                }
            }

            if let Some(registry) = self.step_registry {
                if !registry.supports(step) {
                    report.warnings.push(format!(
                        "No executor registered for step '{}' of type {}",
                        step.name, step.kind
                    ));
                }
            }
        }

        for child in &step.children {
            self.validate_step(child, seen_ids, report);
        }
    }
}

impl Default for SequenceValidator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            is_valid: true,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
