// ABOUTME: Step conditions and the comparison operators they use
// ABOUTME: Parses operator names and symbols, rejecting anything unrecognised

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::parser::FormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConditionOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Equals => "Equals",
            ConditionOperator::NotEquals => "NotEquals",
            ConditionOperator::GreaterThan => "GreaterThan",
            ConditionOperator::LessThan => "LessThan",
            ConditionOperator::Contains => "Contains",
            ConditionOperator::Exists => "Exists",
        }
    }
}

impl FromStr for ConditionOperator {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let operator = match trimmed {
            "=" | "==" => ConditionOperator::Equals,
            "!=" | "<>" => ConditionOperator::NotEquals,
            ">" => ConditionOperator::GreaterThan,
            "<" => ConditionOperator::LessThan,
            other => match other.to_ascii_lowercase().as_str() {
                "equals" | "eq" => ConditionOperator::Equals,
                "notequals" | "ne" => ConditionOperator::NotEquals,
                "greaterthan" | "gt" => ConditionOperator::GreaterThan,
                "lessthan" | "lt" => ConditionOperator::LessThan,
                "contains" => ConditionOperator::Contains,
                "exists" => ConditionOperator::Exists,
                _ => return Err(FormatError::UnknownOperator(s.to_string())),
            },
        };
        Ok(operator)
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConditionOperator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConditionOperator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A predicate over one variable. A step runs only when all of its conditions hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSequenceCondition {
    #[serde(alias = "variable")]
    pub variable_name: String,
    #[serde(default)]
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: String,
}

impl TaskSequenceCondition {
    pub fn new(
        variable_name: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            variable_name: variable_name.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn exists(variable_name: impl Into<String>) -> Self {
        Self::new(variable_name, ConditionOperator::Exists, "")
    }
}

impl fmt::Display for TaskSequenceCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            ConditionOperator::Exists => write!(f, "{} Exists", self.variable_name),
            op => write!(f, "{} {} '{}'", self.variable_name, op, self.value),
        }
    }
}
