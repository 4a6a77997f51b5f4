// ABOUTME: XML codec for task sequence documents built on quick-xml
// ABOUTME: Reads into a small element tree, then maps elements onto the sequence model

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::error::{FormatError, Result};
use super::registry::{Format, SequenceParser};
use crate::model::{
    new_id, StepKind, TaskSequence, TaskSequenceCondition, TaskSequenceStep,
    TaskSequenceVariable,
};
use crate::model::sequence::{DEFAULT_SEQUENCE_NAME, DEFAULT_SEQUENCE_VERSION};

const ROOT_NAMES: &[&str] = &["TaskSequence", "sequence"];
const STEP_ATTRIBUTES: &[&str] = &["id", "name", "type", "description", "enabled", "continueOnError"];

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|child| child.name.eq_ignore_ascii_case(name))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children
            .iter()
            .filter(move |child| child.name.eq_ignore_ascii_case(name))
    }

    /// Text of a leaf element. Whitespace around child elements is not content.
    fn leaf_text(&self) -> &str {
        if self.children.is_empty() {
            &self.text
        } else {
            ""
        }
    }
}

fn start_element(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(FormatError::InvalidRoot(
            "document has more than one root element".to_string(),
        ));
    }
    *root = Some(element);
    Ok(())
}

fn read_document(content: &str) -> Result<Element> {
    let mut reader = Reader::from_str(content);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(start_element(&start)?),
            Event::Empty(start) => {
                let element = start_element(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    FormatError::InvalidRoot("unbalanced closing tag".to_string())
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(FormatError::InvalidRoot(format!(
            "element <{}> is never closed",
            open.name
        )));
    }
    root.ok_or_else(|| FormatError::InvalidRoot("document has no root element".to_string()))
}

fn parse_bool(field: &str, raw: Option<&str>, default: bool) -> Result<bool> {
    match raw.map(str::trim) {
        None => Ok(default),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(FormatError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_timestamp(field: &str, raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        None => Ok(Utc::now()),
        Some(value) => DateTime::parse_from_rfc3339(value.trim())
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|_| FormatError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
            }),
    }
}

fn description_of(element: &Element) -> String {
    element
        .child("description")
        .map(|d| d.leaf_text().to_string())
        .or_else(|| element.attr("description").map(str::to_string))
        .unwrap_or_default()
}

/// Step elements live under `<steps>`; older documents put `<step>`/`<group>` directly
/// under their parent.
fn step_elements(parent: &Element) -> Vec<&Element> {
    match parent.child("steps") {
        Some(steps) => steps.children.iter().collect(),
        None => parent
            .children
            .iter()
            .filter(|child| {
                child.name.eq_ignore_ascii_case("step") || child.name.eq_ignore_ascii_case("group")
            })
            .collect(),
    }
}

fn parse_variable(element: &Element) -> Result<TaskSequenceVariable> {
    let name = element
        .attr("name")
        .ok_or_else(|| FormatError::MissingAttribute {
            element: element.name.clone(),
            attribute: "name".to_string(),
        })?;
    let value = element
        .attr("value")
        .map(str::to_string)
        .unwrap_or_else(|| element.leaf_text().to_string());

    Ok(TaskSequenceVariable {
        name: name.to_string(),
        value,
        is_read_only: parse_bool("variable readonly", element.attr("readonly"), false)?,
        is_secret: parse_bool("variable secret", element.attr("secret"), false)?,
    })
}

fn parse_condition(element: &Element) -> Result<TaskSequenceCondition> {
    let variable_name = element
        .attr("variable")
        .or_else(|| element.attr("variableName"))
        .ok_or_else(|| FormatError::MissingAttribute {
            element: element.name.clone(),
            attribute: "variable".to_string(),
        })?;
    let operator = match element.attr("operator") {
        Some(raw) => raw.parse()?,
        None => Default::default(),
    };

    Ok(TaskSequenceCondition {
        variable_name: variable_name.to_string(),
        operator,
        value: element.attr("value").unwrap_or_default().to_string(),
    })
}

fn parse_step(element: &Element) -> Result<TaskSequenceStep> {
    let kind = StepKind::from_alias(element.attr("type").unwrap_or(&element.name));

    let mut properties = IndexMap::new();
    for (key, value) in &element.attributes {
        if !STEP_ATTRIBUTES.iter().any(|known| known.eq_ignore_ascii_case(key)) {
            properties.insert(key.clone(), value.clone());
        }
    }
    if let Some(block) = element.child("properties") {
        for property in &block.children {
            let key = match property.attr("name") {
                Some(name) if property.name == "property" => name.to_string(),
                _ => property.name.clone(),
            };
            properties.insert(key, property.leaf_text().to_string());
        }
    }

    let conditions = match element.child("conditions") {
        Some(block) => block
            .children_named("condition")
            .map(parse_condition)
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let children = step_elements(element)
        .into_iter()
        .map(parse_step)
        .collect::<Result<Vec<_>>>()?;

    Ok(TaskSequenceStep {
        id: element.attr("id").map(str::to_string).unwrap_or_else(new_id),
        name: element.attr("name").unwrap_or_default().to_string(),
        description: description_of(element),
        kind,
        enabled: parse_bool("step enabled", element.attr("enabled"), true)?,
        continue_on_error: parse_bool(
            "step continueOnError",
            element.attr("continueOnError"),
            false,
        )?,
        conditions,
        properties,
        children,
    })
}

fn is_sequence_root(element: &Element) -> bool {
    ROOT_NAMES
        .iter()
        .any(|name| element.name.eq_ignore_ascii_case(name))
}

fn parse_sequence(root: &Element) -> Result<TaskSequence> {
    if !is_sequence_root(root) {
        return Err(FormatError::InvalidRoot(format!(
            "expected <TaskSequence> or <sequence>, found <{}>",
            root.name
        )));
    }

    let variables = match root.child("variables").or_else(|| root.child("globalVarList")) {
        Some(block) => block
            .children
            .iter()
            .filter(|child| {
                child.name.eq_ignore_ascii_case("variable")
                    || child.name.eq_ignore_ascii_case("property")
            })
            .map(parse_variable)
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let steps = step_elements(root)
        .into_iter()
        .map(parse_step)
        .collect::<Result<Vec<_>>>()?;

    Ok(TaskSequence {
        id: root.attr("id").map(str::to_string).unwrap_or_else(new_id),
        name: root.attr("name").unwrap_or(DEFAULT_SEQUENCE_NAME).to_string(),
        description: description_of(root),
        version: root
            .attr("version")
            .unwrap_or(DEFAULT_SEQUENCE_VERSION)
            .to_string(),
        created_date: parse_timestamp("created", root.attr("created"))?,
        modified_date: parse_timestamp("modified", root.attr("modified"))?,
        variables,
        steps,
    })
}

/// Keys that can be written as `<Key>` elements. Anything else uses `<property name=..>`.
fn is_element_name(key: &str) -> bool {
    let mut chars = key.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    valid_start
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !key.to_ascii_lowercase().starts_with("xml")
        && key != "property"
}

type XmlWriter = Writer<Vec<u8>>;

fn write_text_element(writer: &mut XmlWriter, start: BytesStart<'_>, text: &str) -> Result<()> {
    if text.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

fn write_step(writer: &mut XmlWriter, step: &TaskSequenceStep) -> Result<()> {
    let enabled = step.enabled.to_string();
    let continue_on_error = step.continue_on_error.to_string();
    let mut start = BytesStart::new("step");
    start.push_attribute(("id", step.id.as_str()));
    start.push_attribute(("name", step.name.as_str()));
    start.push_attribute(("type", step.kind.as_str()));
    start.push_attribute(("enabled", enabled.as_str()));
    start.push_attribute(("continueOnError", continue_on_error.as_str()));
    writer.write_event(Event::Start(start))?;

    if !step.description.is_empty() {
        write_text_element(writer, BytesStart::new("description"), &step.description)?;
    }

    if !step.properties.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("properties")))?;
        for (key, value) in &step.properties {
            let start = if is_element_name(key) {
                BytesStart::new(key.as_str())
            } else {
                let mut start = BytesStart::new("property");
                start.push_attribute(("name", key.as_str()));
                start
            };
            write_text_element(writer, start, value)?;
        }
        writer.write_event(Event::End(BytesEnd::new("properties")))?;
    }

    if !step.conditions.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("conditions")))?;
        for condition in &step.conditions {
            let mut start = BytesStart::new("condition");
            start.push_attribute(("variable", condition.variable_name.as_str()));
            start.push_attribute(("operator", condition.operator.as_str()));
            start.push_attribute(("value", condition.value.as_str()));
            writer.write_event(Event::Empty(start))?;
        }
        writer.write_event(Event::End(BytesEnd::new("conditions")))?;
    }

    if !step.children.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("steps")))?;
        for child in &step.children {
            write_step(writer, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new("steps")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("step")))?;
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct XmlSequenceParser;

impl XmlSequenceParser {
    pub fn new() -> Self {
        Self
    }
}

impl SequenceParser for XmlSequenceParser {
    fn format(&self) -> Format {
        Format::Xml
    }

    fn can_parse(&self, content: &str) -> bool {
        read_document(content)
            .map(|root| is_sequence_root(&root))
            .unwrap_or(false)
    }

    fn parse(&self, content: &str) -> Result<TaskSequence> {
        let root = read_document(content)?;
        parse_sequence(&root)
    }

    fn serialize(&self, sequence: &TaskSequence) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let created = sequence
            .created_date
            .to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let modified = sequence
            .modified_date
            .to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let mut root = BytesStart::new("TaskSequence");
        root.push_attribute(("id", sequence.id.as_str()));
        root.push_attribute(("name", sequence.name.as_str()));
        root.push_attribute(("version", sequence.version.as_str()));
        root.push_attribute(("created", created.as_str()));
        root.push_attribute(("modified", modified.as_str()));
        writer.write_event(Event::Start(root))?;

        if !sequence.description.is_empty() {
            write_text_element(
                &mut writer,
                BytesStart::new("description"),
                &sequence.description,
            )?;
        }

        writer.write_event(Event::Start(BytesStart::new("variables")))?;
        for variable in &sequence.variables {
            let read_only = variable.is_read_only.to_string();
            let secret = variable.is_secret.to_string();
            let mut start = BytesStart::new("variable");
            start.push_attribute(("name", variable.name.as_str()));
            start.push_attribute(("value", variable.value.as_str()));
            start.push_attribute(("readonly", read_only.as_str()));
            start.push_attribute(("secret", secret.as_str()));
            writer.write_event(Event::Empty(start))?;
        }
        writer.write_event(Event::End(BytesEnd::new("variables")))?;

        writer.write_event(Event::Start(BytesStart::new("steps")))?;
        for step in &sequence.steps {
            write_step(&mut writer, step)?;
        }
        writer.write_event(Event::End(BytesEnd::new("steps")))?;

        writer.write_event(Event::End(BytesEnd::new("TaskSequence")))?;

        String::from_utf8(writer.into_inner()).map_err(|e| FormatError::InvalidValue {
            field: "document encoding".to_string(),
            value: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConditionOperator;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<sequence id="ts-42" name="Windows 11" version="2.1">
  <description>Standard image</description>
  <variables>
    <variable name="OSDComputerName" value="WS-01" />
    <variable name="AdminPassword" value="s3cret" secret="true" readonly="True" />
  </variables>
  <steps>
    <step id="g1" name="Preinstall" type="Group">
      <steps>
        <setvariable id="s1" name="Mark" Owner="ops">
          <properties>
            <VariableName>Phase</VariableName>
            <VariableValue>  pre  </VariableValue>
            <property name="Key With Spaces">x</property>
          </properties>
          <conditions>
            <condition variable="OSDComputerName" operator="!=" value="" />
          </conditions>
        </setvariable>
      </steps>
    </step>
    <step id="r1" name="Reboot" type="restart" enabled="false" continueOnError="TRUE" />
  </steps>
</sequence>"#;

    #[test]
    fn test_probe_accepts_only_sequence_roots() {
        let parser = XmlSequenceParser::new();
        assert!(parser.can_parse(SAMPLE));
        assert!(parser.can_parse("<TaskSequence/>"));
        assert!(!parser.can_parse("<html/>"));
        assert!(!parser.can_parse("<sequence>"));
        assert!(!parser.can_parse(r#"{"name": "x"}"#));
        assert!(!parser.can_parse("plain text"));
    }

    #[test]
    fn test_parse_sample() {
        let seq = XmlSequenceParser::new().parse(SAMPLE).unwrap();

        assert_eq!(seq.id, "ts-42");
        assert_eq!(seq.name, "Windows 11");
        assert_eq!(seq.version, "2.1");
        assert_eq!(seq.description, "Standard image");
        assert_eq!(seq.variables.len(), 2);
        assert!(seq.variables[1].is_secret);
        assert!(seq.variables[1].is_read_only);

        let group = &seq.steps[0];
        assert_eq!(group.kind, StepKind::Group);
        let child = &group.children[0];
        assert_eq!(child.kind, StepKind::SetVariable);
        assert_eq!(child.property("VariableValue"), Some("  pre  "));
        assert_eq!(child.property("Key With Spaces"), Some("x"));
        assert_eq!(child.property("Owner"), Some("ops"));
        assert_eq!(child.conditions[0].operator, ConditionOperator::NotEquals);

        let reboot = &seq.steps[1];
        assert_eq!(reboot.kind, StepKind::RestartComputer);
        assert!(!reboot.enabled);
        assert!(reboot.continue_on_error);
    }

    #[test]
    fn test_unknown_operator_fails() {
        let xml = r#"<TaskSequence><steps><step name="a" type="Custom">
            <conditions><condition variable="A" operator="like" value="x"/></conditions>
        </step></steps></TaskSequence>"#;
        let err = XmlSequenceParser::new().parse(xml).unwrap_err();
        assert!(matches!(err, FormatError::UnknownOperator(op) if op == "like"));
    }

    #[test]
    fn test_invalid_boolean_fails() {
        let xml = r#"<TaskSequence><steps><step name="a" enabled="maybe"/></steps></TaskSequence>"#;
        let err = XmlSequenceParser::new().parse(xml).unwrap_err();
        assert!(matches!(err, FormatError::InvalidValue { .. }));
    }

    #[test]
    fn test_variable_without_name_fails() {
        let xml = r#"<TaskSequence><variables><variable value="1"/></variables></TaskSequence>"#;
        let err = XmlSequenceParser::new().parse(xml).unwrap_err();
        assert!(matches!(err, FormatError::MissingAttribute { .. }));
    }

    #[test]
    fn test_round_trip_preserves_awkward_keys_and_text() {
        let seq = TaskSequence::new("Round <trip> & co").with_step(
            TaskSequenceStep::new("Run", StepKind::RunCommandLine)
                .with_property("CommandLine", "echo \"a & b\" > out.txt")
                .with_property("1st key", "leading digit")
                .with_property("Empty", "")
                .with_property("Padded", "  spaced\tout  "),
        );

        let parser = XmlSequenceParser::new();
        let xml = parser.serialize(&seq).unwrap();
        let parsed = parser.parse(&xml).unwrap();

        assert_eq!(parsed, seq);
    }
}
