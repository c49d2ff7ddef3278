use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Tool-input fields checked, in order, for a file path.
pub const PATH_FIELDS: &[&str] = &["file_path", "path", "filePath", "file", "filename"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum EntryKind {
    User,
    Assistant,
    System,
    Summary,
    QueueOperation,
    #[default]
    Other,
}

impl From<String> for EntryKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "summary" => Self::Summary,
            "queue-operation" => Self::QueueOperation,
            _ => Self::Other,
        }
    }
}

impl EntryKind {
    /// Kinds a query may filter on; `None` for any other name.
    pub fn from_filter_name(name: &str) -> Option<Self> {
        match name {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "queue-operation" => Some(Self::QueueOperation),
            _ => None,
        }
    }
}

impl Serialize for EntryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
            Self::Summary => write!(f, "summary"),
            Self::QueueOperation => write!(f, "queue-operation"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One record of a session or agent log.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// UUID of the assistant turn whose tool call produced this record.
    #[serde(
        default,
        rename = "sourceToolAssistantUUID",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_assistant_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_result: Option<Value>,
}

impl ConversationEntry {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|stamp| stamp.with_timezone(&Utc))
    }

    /// The `toolUseResult` payload when it has the shape of a spawn descriptor.
    ///
    /// Tool results are free-form (plain strings for failed calls), so any
    /// non-object or mistyped payload yields `None`.
    pub fn spawn_descriptor(&self) -> Option<SpawnDescriptor> {
        let value = self.tool_use_result.as_ref().filter(|value| value.is_object())?;
        SpawnDescriptor::deserialize(value).ok()
    }

    pub fn tool_calls(&self) -> Vec<ToolUse> {
        if self.kind != EntryKind::Assistant {
            return Vec::new();
        }

        self.content_blocks()
            .into_iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
            .map(|block| {
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                ToolUse {
                    kind: ToolKind::from_name(&name),
                    name,
                    input: block.get("input").map(ToolInput::from_value).unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Plain text of the message, with text blocks joined by newlines.
    pub fn text_content(&self) -> String {
        let Some(content) = self.message_content() else {
            return String::new();
        };

        if let Some(text) = content.as_str() {
            return text.to_string();
        }

        self.content_blocks()
            .into_iter()
            .filter(|block| {
                block
                    .get("type")
                    .and_then(Value::as_str)
                    .is_none_or(|kind| kind == "text")
            })
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn message_content(&self) -> Option<&Value> {
        let message = self.message.as_ref()?;
        match message.get("content") {
            Some(content) => Some(content),
            None => Some(message),
        }
    }

    fn content_blocks(&self) -> Vec<&Value> {
        match self.message_content() {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item @ Value::Object(_)) => vec![item],
            _ => Vec::new(),
        }
    }
}

/// The `toolUseResult` attached to a record when an agent was launched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnDescriptor {
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "agentId")]
    pub spawned_agent_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub output_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Bash,
    Read,
    Write,
    Edit,
    Task,
    Glob,
    Grep,
    WebFetch,
    WebSearch,
    NotebookEdit,
    AskUserQuestion,
    Other,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "bash" => Self::Bash,
            "read" => Self::Read,
            "write" => Self::Write,
            "edit" => Self::Edit,
            "task" => Self::Task,
            "glob" => Self::Glob,
            "grep" => Self::Grep,
            "webfetch" => Self::WebFetch,
            "websearch" => Self::WebSearch,
            "notebookedit" => Self::NotebookEdit,
            "askuserquestion" => Self::AskUserQuestion,
            _ => Self::Other,
        }
    }

    pub fn is_known(name: &str) -> bool {
        Self::from_name(name) != Self::Other
    }

    pub fn is_file_operation(self) -> bool {
        matches!(
            self,
            Self::Read | Self::Write | Self::Edit | Self::Glob | Self::Grep | Self::NotebookEdit
        )
    }
}

/// String-valued fields of a tool call's input, in document order.
///
/// Non-string values are dropped: nothing downstream matches against them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInput {
    fields: Vec<(String, String)>,
}

impl ToolInput {
    pub fn from_value(value: &Value) -> Self {
        let fields = value
            .as_object()
            .into_iter()
            .flatten()
            .filter_map(|(key, value)| value.as_str().map(|text| (key.clone(), text.to_string())))
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUse {
    pub name: String,
    pub kind: ToolKind,
    pub input: ToolInput,
}

impl ToolUse {
    /// First of [`PATH_FIELDS`] present in the input.
    pub fn file_path(&self) -> Option<&str> {
        PATH_FIELDS.iter().find_map(|field| self.input.get(field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    #[serde(rename = "agentId")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    pub file_path: PathBuf,
    pub entry_count: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub agent_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnLink {
    pub agent_id: String,
    /// UUID of the record carrying the spawn descriptor.
    pub spawn_uuid: String,
    pub parent_uuid: String,
    /// Agent whose own log contained the spawn, `None` for the main session log.
    pub source_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub agent_id: String,
    pub session_id: String,
    pub file_path: PathBuf,
    pub entry_count: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub agent_type: String,
    pub is_root: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub parent_uuid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMatch {
    pub agent_id: String,
    pub session_id: String,
    pub project_path: PathBuf,
    pub jsonl_path: PathBuf,
    pub entry_count: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub agent_type: String,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub matched_files: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub matched_tools: BTreeSet<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl AgentMatch {
    pub fn is_main_session(&self) -> bool {
        self.agent_id.is_empty()
    }
}

/// Search criteria for [`crate::search::find_agents`]. Unset criteria impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindAgentsOptions {
    /// Glob matched against paths touched by file-operation tools.
    pub explored_pattern: Option<String>,
    /// Tool names, compared case-insensitively.
    pub tool_types: Vec<String>,
    /// Regex matched against every string field of every tool input.
    pub tool_input_pattern: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Session,
    Agent,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// A full ID sharing an ambiguous prefix, with labelled details to tell it apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousCandidate {
    pub id: String,
    pub details: Vec<(&'static str, String)>,
}
