// ABOUTME: Parser module for task sequence documents in XML, JSON, and YAML
// ABOUTME: Exports the codec trait, probe-based registry, codecs, and validator

pub mod error;
pub mod json;
pub mod registry;
pub mod validation;
pub mod xml;
pub mod yaml;

pub use error::{FormatError, ValidationError};
pub use json::JsonSequenceParser;
pub use registry::{Format, ParserRegistry, SequenceParser};
pub use validation::{SequenceValidator, ValidationReport};
pub use xml::XmlSequenceParser;
pub use yaml::YamlSequenceParser;
