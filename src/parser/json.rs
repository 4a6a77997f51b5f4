// ABOUTME: JSON codec for task sequence documents
// ABOUTME: Probes for an object root carrying a name or steps field

use super::error::{FormatError, Result};
use super::registry::{Format, SequenceParser};
use crate::model::TaskSequence;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSequenceParser;

impl JsonSequenceParser {
    pub fn new() -> Self {
        Self
    }
}

fn has_sequence_root(value: &serde_json::Value) -> bool {
    value.is_object() && (value.get("name").is_some() || value.get("steps").is_some())
}

impl SequenceParser for JsonSequenceParser {
    fn format(&self) -> Format {
        Format::Json
    }

    fn can_parse(&self, content: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(content)
            .map(|value| has_sequence_root(&value))
            .unwrap_or(false)
    }

    fn parse(&self, content: &str) -> Result<TaskSequence> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        if !has_sequence_root(&value) {
            return Err(FormatError::InvalidRoot(
                "expected an object with 'name' or 'steps'".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    fn serialize(&self, sequence: &TaskSequence) -> Result<String> {
        Ok(serde_json::to_string_pretty(sequence)?)
    }
}
