// ABOUTME: Step definitions and the step kind catalog for task sequences
// ABOUTME: Handles kind aliases, per-kind required properties, and lenient document decoding

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::condition::TaskSequenceCondition;

/// The kind of work a step performs. Unknown names decode to `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepKind {
    Group,
    InstallOperatingSystem,
    ApplyWindowsImage,
    ApplyFfuImage,
    InstallApplication,
    InstallDriver,
    CaptureUserState,
    RestoreUserState,
    RunCommandLine,
    RunPowerShell,
    SetVariable,
    RestartComputer,
    FormatAndPartition,
    #[default]
    Custom,
}

const ALL_KINDS: &[StepKind] = &[
    StepKind::Group,
    StepKind::InstallOperatingSystem,
    StepKind::ApplyWindowsImage,
    StepKind::ApplyFfuImage,
    StepKind::InstallApplication,
    StepKind::InstallDriver,
    StepKind::CaptureUserState,
    StepKind::RestoreUserState,
    StepKind::RunCommandLine,
    StepKind::RunPowerShell,
    StepKind::SetVariable,
    StepKind::RestartComputer,
    StepKind::FormatAndPartition,
    StepKind::Custom,
];

// Short names and legacy action class names accepted besides the canonical name.
const ALIASES: &[(&str, StepKind)] = &[
    ("installos", StepKind::InstallOperatingSystem),
    ("applyimage", StepKind::ApplyWindowsImage),
    ("applyffu", StepKind::ApplyFfuImage),
    ("restart", StepKind::RestartComputer),
    ("SMS_TaskSequence_Group", StepKind::Group),
    ("SMS_TaskSequence_RunCommandLineAction", StepKind::RunCommandLine),
    ("SMS_TaskSequence_RunPowerShellScriptAction", StepKind::RunPowerShell),
    ("SMS_TaskSequence_SetVariableAction", StepKind::SetVariable),
    ("SMS_TaskSequence_RebootAction", StepKind::RestartComputer),
    ("SMS_TaskSequence_ApplyOperatingSystemAction", StepKind::ApplyWindowsImage),
    ("SMS_TaskSequence_ApplyDriverPackageAction", StepKind::InstallDriver),
    ("SMS_TaskSequence_InstallApplicationAction", StepKind::InstallApplication),
    ("SMS_TaskSequence_CaptureUserStateAction", StepKind::CaptureUserState),
    ("SMS_TaskSequence_RestoreUserStateAction", StepKind::RestoreUserState),
    ("SMS_TaskSequence_PartitionDiskAction", StepKind::FormatAndPartition),
];

impl StepKind {
    pub fn all() -> &'static [StepKind] {
        ALL_KINDS
    }

    /// Canonical name, used when writing documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Group => "Group",
            StepKind::InstallOperatingSystem => "InstallOperatingSystem",
            StepKind::ApplyWindowsImage => "ApplyWindowsImage",
            StepKind::ApplyFfuImage => "ApplyFFUImage",
            StepKind::InstallApplication => "InstallApplication",
            StepKind::InstallDriver => "InstallDriver",
            StepKind::CaptureUserState => "CaptureUserState",
            StepKind::RestoreUserState => "RestoreUserState",
            StepKind::RunCommandLine => "RunCommandLine",
            StepKind::RunPowerShell => "RunPowerShell",
            StepKind::SetVariable => "SetVariable",
            StepKind::RestartComputer => "RestartComputer",
            StepKind::FormatAndPartition => "FormatAndPartition",
            StepKind::Custom => "Custom",
        }
    }

    /// Resolves a kind from its canonical name or any known alias, ignoring case.
    /// Anything unrecognised becomes `Custom`.
    pub fn from_alias(name: &str) -> StepKind {
        let name = name.trim();
        ALL_KINDS
            .iter()
            .map(|kind| (kind.as_str(), *kind))
            .chain(ALIASES.iter().copied())
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map(|(_, kind)| kind)
            .unwrap_or(StepKind::Custom)
    }

    /// Properties a step of this kind must carry to be runnable.
    pub fn required_properties(&self) -> &'static [&'static str] {
        match self {
            StepKind::InstallOperatingSystem => &["ImagePath", "ImageIndex"],
            StepKind::ApplyWindowsImage => &["WimPath", "ImageIndex", "TargetDrive"],
            StepKind::ApplyFfuImage => &["FFUPath", "TargetDisk"],
            StepKind::InstallApplication => &["ApplicationName", "InstallCommand"],
            StepKind::InstallDriver => &["DriverPath"],
            StepKind::CaptureUserState | StepKind::RestoreUserState => &["StorePath"],
            StepKind::RunCommandLine => &["CommandLine"],
            StepKind::RunPowerShell => &["Script"],
            StepKind::SetVariable => &["VariableName"],
            StepKind::FormatAndPartition => &["DiskNumber"],
            _ => &[],
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StepKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(StepKind::from_alias(&raw))
    }
}

/// One node in the step tree. Group steps carry children; every other kind is a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StepDocument")]
pub struct TaskSequenceStep {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub enabled: bool,
    pub continue_on_error: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<TaskSequenceCondition>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, String>,
    #[serde(rename = "childSteps", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskSequenceStep>,
}

impl TaskSequenceStep {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: super::new_id(),
            name: name.into(),
            description: String::new(),
            kind,
            enabled: true,
            continue_on_error: false,
            conditions: Vec::new(),
            properties: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, StepKind::Group)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_condition(mut self, condition: TaskSequenceCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_child(mut self, child: TaskSequenceStep) -> Self {
        self.children.push(child);
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_group(&self) -> bool {
        self.kind == StepKind::Group
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Number of steps in this subtree, including this one.
    pub fn step_count(&self) -> usize {
        1 + self.children.iter().map(TaskSequenceStep::step_count).sum::<usize>()
    }

    /// Depth-first search of this subtree by step id.
    pub fn find(&self, id: &str) -> Option<&TaskSequenceStep> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

// Wire shape accepted from JSON and YAML. Scalar fields that are not part of the
// step schema are folded into the property bag.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDocument {
    #[serde(default = "super::new_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", alias = "kind", default)]
    kind: StepKind,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    continue_on_error: bool,
    #[serde(default)]
    conditions: Vec<TaskSequenceCondition>,
    #[serde(default)]
    properties: IndexMap<String, serde_yaml::Value>,
    #[serde(default, alias = "children", alias = "steps")]
    child_steps: Vec<TaskSequenceStep>,
    #[serde(flatten)]
    extra: IndexMap<String, serde_yaml::Value>,
}

fn default_enabled() -> bool {
    true
}

fn scalar_text(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl From<StepDocument> for TaskSequenceStep {
    fn from(doc: StepDocument) -> Self {
        let mut properties: IndexMap<String, String> = doc
            .extra
            .into_iter()
            .filter_map(|(key, value)| scalar_text(value).map(|text| (key, text)))
            .collect();
        // Declared properties win over loose fields with the same key.
        for (key, value) in doc.properties {
            let text = match value {
                serde_yaml::Value::Null => String::new(),
                other => scalar_text(other).unwrap_or_default(),
            };
            properties.insert(key, text);
        }

        Self {
            id: doc.id,
            name: doc.name,
            description: doc.description,
            kind: doc.kind,
            enabled: doc.enabled,
            continue_on_error: doc.continue_on_error,
            conditions: doc.conditions,
            properties,
            children: doc.child_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases_resolve_case_insensitively() {
        assert_eq!(StepKind::from_alias("installos"), StepKind::InstallOperatingSystem);
        assert_eq!(StepKind::from_alias("ApplyImage"), StepKind::ApplyWindowsImage);
        assert_eq!(StepKind::from_alias("applyffuimage"), StepKind::ApplyFfuImage);
        assert_eq!(StepKind::from_alias("applyffu"), StepKind::ApplyFfuImage);
        assert_eq!(StepKind::from_alias("RESTART"), StepKind::RestartComputer);
        assert_eq!(StepKind::from_alias("runcommandline"), StepKind::RunCommandLine);
        assert_eq!(
            StepKind::from_alias("SMS_TaskSequence_RunCommandLineAction"),
            StepKind::RunCommandLine
        );
    }

    #[test]
    fn test_unknown_kind_is_custom() {
        assert_eq!(StepKind::from_alias("FlashFirmware"), StepKind::Custom);
        assert_eq!(StepKind::from_alias(""), StepKind::Custom);
    }

    #[test]
    fn test_canonical_names_round_trip() {
        for kind in StepKind::all() {
            assert_eq!(StepKind::from_alias(kind.as_str()), *kind);
        }
    }

    #[test]
    fn test_required_properties() {
        assert_eq!(StepKind::RunCommandLine.required_properties(), &["CommandLine"]);
        assert_eq!(StepKind::SetVariable.required_properties(), &["VariableName"]);
        assert!(StepKind::Group.required_properties().is_empty());
        assert!(StepKind::Custom.required_properties().is_empty());
    }

    #[test]
    fn test_step_count_and_find() {
        let tree = TaskSequenceStep::group("Outer")
            .with_child(TaskSequenceStep::new("A", StepKind::SetVariable).with_id("a"))
            .with_child(
                TaskSequenceStep::group("Inner")
                    .with_child(TaskSequenceStep::new("B", StepKind::RunCommandLine).with_id("b")),
            );

        assert_eq!(tree.step_count(), 4);
        assert_eq!(tree.find("b").map(|s| s.name.as_str()), Some("B"));
        assert!(tree.find("missing").is_none());
    }

    #[test]
    fn test_loose_scalar_fields_become_properties() {
        let step: TaskSequenceStep = serde_json::from_str(
            r#"{"name": "Run", "type": "runcommandline", "CommandLine": "echo hi", "Timeout": 30,
                "properties": {"Timeout": "60"}}"#,
        )
        .unwrap();

        assert_eq!(step.kind, StepKind::RunCommandLine);
        assert!(step.enabled);
        assert_eq!(step.property("CommandLine"), Some("echo hi"));
        assert_eq!(step.property("Timeout"), Some("60"));
        assert!(!step.id.is_empty());
    }
}
