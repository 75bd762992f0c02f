use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Where a line came from: the file name (not the full path) and its 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub file: String,
    pub line: usize,
}

impl Origin {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One parsed log line that takes part in a conversation tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub parent_id: Option<String>,
    pub origin: Origin,
    pub timestamp: Option<DateTime<Utc>>,
    pub raw: Map<String, Value>,
    pub kind: RecordKind,
}

impl Record {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn type_tag(&self) -> &str {
        self.raw.get("type").and_then(Value::as_str).unwrap_or("")
    }

    pub fn git_branch(&self) -> Option<&str> {
        self.raw.get("gitBranch").and_then(Value::as_str)
    }

    /// True for every record a person typed, commands included.
    pub fn is_user_authored(&self) -> bool {
        !matches!(self.kind, RecordKind::AssistantMessage(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKind {
    UserMessage(UserMessage),
    AssistantMessage(AssistantMessage),
    BuiltInCommand(BuiltInCommand),
    UserDefinedCommand(UserDefinedCommand),
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::UserMessage(_) => "user_message",
            RecordKind::AssistantMessage(_) => "assistant_message",
            RecordKind::BuiltInCommand(_) => "built_in_command",
            RecordKind::UserDefinedCommand(_) => "user_defined_command",
        }
    }

    pub fn command(&self) -> Option<&CommandTags> {
        match self {
            RecordKind::BuiltInCommand(c) => Some(&c.command),
            RecordKind::UserDefinedCommand(c) => Some(&c.command),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: UserContent,
}

/// Classification of `message.content` on a user line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContent {
    Text { text: String },
    ToolResult { tool_use_id: Option<String> },
    Interrupt,
    Unknown,
}

impl UserContent {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserContent::Text { .. } => "text",
            UserContent::ToolResult { .. } => "tool_result",
            UserContent::Interrupt => "interrupt",
            UserContent::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub model: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// A `tool_use` block paired with the result payload that answered it, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: Option<String>,
    pub input: Value,
    pub result: Option<Value>,
}

/// Fields pulled out of `<command-name>`, `<command-message>` and `<command-args>`.
/// A missing tag is `None`, never a warning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTags {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub args: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltInCommand {
    pub command: CommandTags,
    pub stdout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDefinedCommand {
    pub command: CommandTags,
    pub expanded_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub leaf_id: String,
    pub origin: Origin,
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnknownRecordType,
    UnexpectedAttributes,
    UnexpectedContentShape,
    MultipleRoots,
    OrphanedRecord,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::UnknownRecordType => "unknown_record_type",
            WarningKind::UnexpectedAttributes => "unexpected_attributes",
            WarningKind::UnexpectedContentShape => "unexpected_content_shape",
            WarningKind::MultipleRoots => "multiple_roots",
            WarningKind::OrphanedRecord => "orphaned_record",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal finding. Never stops construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub raw: Option<Value>,
}

impl Warning {
    pub fn at(kind: WarningKind, message: impl Into<String>, origin: &Origin) -> Self {
        Self {
            kind,
            message: message.into(),
            file: Some(origin.file.clone()),
            line: Some(origin.line),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line} {}: {}", self.kind, self.message),
            (Some(file), None) => write!(f, "{file} {}: {}", self.kind, self.message),
            _ => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// A line that never reaches the record stream but still holds a place in
/// the tree: children pointing at it are relinked to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub origin: Origin,
    pub reason: HiddenReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HiddenReason {
    /// `<local-command-stdout>` output of a built-in command.
    CommandStdout { text: Option<String> },
    /// System-injected `isMeta` user line; `text` is its first text block.
    Meta { text: Option<String> },
    /// A user line answering a tool call; its payload lives on the call.
    ToolResult { tool_use_id: Option<String> },
    /// A command configured to stay out of the transcript, e.g. `/clear`.
    HiddenCommand { name: String },
    /// `system`, `progress`, `file-history-snapshot` or an unknown type.
    Dropped { type_tag: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownRecord {
    pub type_tag: String,
    pub origin: Origin,
    pub raw: Value,
}

/// The outcome of parsing one line: a closed set, resolved at parse time.
#[derive(Debug, Clone)]
pub enum ParsedLine {
    Record(Record),
    Summary(Summary),
    Hidden(HiddenRecord),
    Unknown(UnknownRecord),
    /// Known bookkeeping line with nothing to keep (no id).
    Ignored,
}

/// Everything one file contributed. Warnings include the record-level ones.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub file: String,
    pub records: Vec<Record>,
    pub summaries: Vec<Summary>,
    pub hidden: Vec<HiddenRecord>,
    pub warnings: Vec<Warning>,
}

impl ParsedFile {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, line: ParsedLine) {
        match line {
            ParsedLine::Record(record) => self.records.push(record),
            ParsedLine::Summary(summary) => self.summaries.push(summary),
            ParsedLine::Hidden(hidden) => self.hidden.push(hidden),
            ParsedLine::Unknown(unknown) => {
                let hidden_id = unknown
                    .raw
                    .get("uuid")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned);
                self.warnings.push(
                    Warning::at(
                        WarningKind::UnknownRecordType,
                        format!("unknown record type: {}", unknown.type_tag),
                        &unknown.origin,
                    )
                    .with_raw(unknown.raw.clone()),
                );
                if let Some(id) = hidden_id {
                    self.hidden.push(HiddenRecord {
                        id,
                        parent_id: unknown
                            .raw
                            .get("parentUuid")
                            .and_then(Value::as_str)
                            .map(ToOwned::to_owned),
                        origin: unknown.origin,
                        reason: HiddenReason::Dropped {
                            type_tag: unknown.type_tag,
                        },
                    });
                }
            }
            ParsedLine::Ignored => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.summaries.is_empty() && self.hidden.is_empty()
    }
}
