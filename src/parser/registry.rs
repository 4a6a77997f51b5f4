// ABOUTME: Codec trait and probe-based registry for task sequence documents
// ABOUTME: Picks the first codec whose probe claims a document and parses with it

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use super::error::{FormatError, Result};
use super::json::JsonSequenceParser;
use super::xml::XmlSequenceParser;
use super::yaml::YamlSequenceParser;
use crate::model::TaskSequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Format {
    Xml,
    Json,
    Yaml,
}

impl Format {
    /// Maps a file extension to a format, ignoring case.
    pub fn from_path(path: &Path) -> Option<Format> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "xml" => Some(Format::Xml),
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Xml => "xml",
            Format::Json => "json",
            Format::Yaml => "yaml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Xml => "XML",
            Format::Json => "JSON",
            Format::Yaml => "YAML",
        })
    }
}

impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xml" => Ok(Format::Xml),
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            _ => Err(FormatError::InvalidValue {
                field: "format".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// A codec for one document format.
pub trait SequenceParser: Send + Sync {
    fn format(&self) -> Format;

    /// Cheap structural probe. Must reject text that is not plausibly a task sequence
    /// in this format.
    fn can_parse(&self, content: &str) -> bool;

    fn parse(&self, content: &str) -> Result<TaskSequence>;

    fn serialize(&self, sequence: &TaskSequence) -> Result<String>;
}

pub struct ParserRegistry {
    parsers: Vec<Box<dyn SequenceParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// XML, JSON, then YAML. YAML goes last because most JSON is also valid YAML.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(XmlSequenceParser::new()));
        registry.register(Box::new(JsonSequenceParser::new()));
        registry.register(Box::new(YamlSequenceParser::new()));
        registry
    }

    pub fn register(&mut self, parser: Box<dyn SequenceParser>) {
        self.parsers.push(parser);
    }

    pub fn detect(&self, content: &str) -> Option<&dyn SequenceParser> {
        self.parsers
            .iter()
            .find(|parser| parser.can_parse(content))
            .map(|parser| parser.as_ref())
    }

    pub fn by_format(&self, format: Format) -> Option<&dyn SequenceParser> {
        self.parsers
            .iter()
            .find(|parser| parser.format() == format)
            .map(|parser| parser.as_ref())
    }

    /// Parses with the first codec that claims the document. A codec that claims a
    /// document and then fails to parse it is final; no other codec is tried.
    pub fn parse(&self, content: &str) -> Result<TaskSequence> {
        let parser = self.detect(content).ok_or(FormatError::UnrecognizedFormat)?;
        debug!("Parsing task sequence as {}", parser.format());
        parser.parse(content)
    }

    pub fn parse_as(&self, content: &str, format: Format) -> Result<TaskSequence> {
        let parser = self
            .by_format(format)
            .ok_or(FormatError::UnrecognizedFormat)?;
        parser.parse(content)
    }

    pub async fn parse_file<P: AsRef<Path>>(
        &self,
        path: P,
        format: Option<Format>,
    ) -> Result<TaskSequence> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        match format {
            Some(format) => self.parse_as(&content, format),
            None => self.parse(&content),
        }
    }

    pub fn serialize(&self, sequence: &TaskSequence, format: Format) -> Result<String> {
        let parser = self
            .by_format(format)
            .ok_or(FormatError::UnrecognizedFormat)?;
        parser.serialize(sequence)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
