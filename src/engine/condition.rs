// ABOUTME: Evaluates step conditions against the variable store
// ABOUTME: Compares numerically when both sides parse as numbers, otherwise as case-folded text

use std::cmp::Ordering;
use tracing::debug;

use crate::model::{ConditionOperator, TaskSequenceCondition};
use crate::variables::store::fold_case;
use crate::variables::VariableStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// True when every condition holds. Stops at the first one that does not.
    pub fn evaluate_all(
        &self,
        conditions: &[TaskSequenceCondition],
        variables: &VariableStore,
    ) -> bool {
        conditions.iter().all(|condition| {
            let met = self.evaluate_one(condition, variables);
            if !met {
                debug!("Condition not met: {}", condition);
            }
            met
        })
    }

    pub fn evaluate_one(&self, condition: &TaskSequenceCondition, variables: &VariableStore) -> bool {
        if condition.operator == ConditionOperator::Exists {
            return variables.exists(&condition.variable_name);
        }

        let actual = variables.get(&condition.variable_name);
        let expected = condition.value.as_str();

        match condition.operator {
            ConditionOperator::Equals => fold_case(&actual) == fold_case(expected),
            ConditionOperator::NotEquals => fold_case(&actual) != fold_case(expected),
            ConditionOperator::GreaterThan => compare(&actual, expected) == Ordering::Greater,
            ConditionOperator::LessThan => compare(&actual, expected) == Ordering::Less,
            ConditionOperator::Contains => fold_case(&actual).contains(&fold_case(expected)),
            ConditionOperator::Exists => variables.exists(&condition.variable_name),
        }
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}

fn compare(actual: &str, expected: &str) -> Ordering {
    if let (Some(a), Some(b)) = (parse_number(actual), parse_number(expected)) {
        if let Some(ordering) = a.partial_cmp(&b) {
            return ordering;
        }
    }
    fold_case(actual).cmp(&fold_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VariableStore {
        let store = VariableStore::new();
        store.set("Arch", "X64").unwrap();
        store.set("Memory", "16").unwrap();
        store.set("Model", "Latitude 7440").unwrap();
        store.set("Empty", "").unwrap();
        store.set("Ten", "10").unwrap();
        store.set("Word", "alpha").unwrap();
        store
    }

    fn check(variable: &str, operator: ConditionOperator, value: &str) -> bool {
        ConditionEvaluator::new()
            .evaluate_one(&TaskSequenceCondition::new(variable, operator, value), &store())
    }

    #[test]
    fn test_equality_ignores_case() {
        assert!(check("arch", ConditionOperator::Equals, "x64"));
        assert!(!check("Arch", ConditionOperator::NotEquals, "X64"));
        assert!(check("Arch", ConditionOperator::NotEquals, "arm64"));
        assert!(check("Missing", ConditionOperator::Equals, ""));
    }

    #[test]
    fn test_numeric_comparison() {
        assert!(check("Memory", ConditionOperator::GreaterThan, "8"));
        assert!(check("Memory", ConditionOperator::LessThan, "100"));
        assert!(!check("Memory", ConditionOperator::GreaterThan, "16"));
        assert!(check("Memory", ConditionOperator::GreaterThan, " 9.5 "));
    }

    #[test]
    fn test_lexical_fallback() {
        // "16" vs "abc" is not numeric on both sides, so '1' < 'A'.
        assert!(check("Memory", ConditionOperator::LessThan, "abc"));
        assert!(check("Model", ConditionOperator::GreaterThan, "dell"));
        assert!(check("Arch", ConditionOperator::LessThan, "y"));
    }

    #[test]
    fn test_numbers_compare_as_numbers_and_words_as_text() {
        // Lexically "10" < "9"; numerically it is greater.
        assert!(check("Ten", ConditionOperator::GreaterThan, "9"));
        assert!(!check("Ten", ConditionOperator::LessThan, "9"));

        assert!(!check("Word", ConditionOperator::GreaterThan, "beta"));
        assert!(check("Word", ConditionOperator::LessThan, "beta"));
    }

    #[test]
    fn test_contains_and_exists() {
        assert!(check("Model", ConditionOperator::Contains, "latitude"));
        assert!(!check("Model", ConditionOperator::Contains, "precision"));
        assert!(check("Empty", ConditionOperator::Exists, "ignored"));
        assert!(!check("Missing", ConditionOperator::Exists, ""));
    }

    #[test]
    fn test_evaluate_all() {
        let evaluator = ConditionEvaluator::new();
        let variables = store();

        assert!(evaluator.evaluate_all(&[], &variables));
        assert!(evaluator.evaluate_all(
            &[
                TaskSequenceCondition::new("Arch", ConditionOperator::Equals, "x64"),
                TaskSequenceCondition::exists("Model"),
            ],
            &variables
        ));
        assert!(!evaluator.evaluate_all(
            &[
                TaskSequenceCondition::exists("Missing"),
                TaskSequenceCondition::new("Arch", ConditionOperator::Equals, "x64"),
            ],
            &variables
        ));
    }
}
