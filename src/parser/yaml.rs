// ABOUTME: YAML codec for task sequence documents
// ABOUTME: Shares the JSON field layout and probes for a mapping root with name or steps

use super::error::{FormatError, Result};
use super::registry::{Format, SequenceParser};
use crate::model::TaskSequence;

#[derive(Debug, Default, Clone, Copy)]
pub struct YamlSequenceParser;

impl YamlSequenceParser {
    pub fn new() -> Self {
        Self
    }
}

fn has_sequence_root(value: &serde_yaml::Value) -> bool {
    value.is_mapping() && (value.get("name").is_some() || value.get("steps").is_some())
}

impl SequenceParser for YamlSequenceParser {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn can_parse(&self, content: &str) -> bool {
        serde_yaml::from_str::<serde_yaml::Value>(content)
            .map(|value| has_sequence_root(&value))
            .unwrap_or(false)
    }

    fn parse(&self, content: &str) -> Result<TaskSequence> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        if !has_sequence_root(&value) {
            return Err(FormatError::InvalidRoot(
                "expected a mapping with 'name' or 'steps'".to_string(),
            ));
        }
        Ok(serde_yaml::from_value(value)?)
    }

    fn serialize(&self, sequence: &TaskSequence) -> Result<String> {
        Ok(serde_yaml::to_string(sequence)?)
    }
}
