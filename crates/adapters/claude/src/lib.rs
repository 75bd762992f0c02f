use std::path::Path;

use adapter_common::ParseError;
use core_model::{
    AssistantMessage, BuiltInCommand, HiddenReason, HiddenRecord, Origin, ParsedFile, ParsedLine,
    Record, RecordKind, Summary, ToolCall, UnknownRecord, UserContent, UserMessage, Warning,
    WarningKind,
};
use serde_json::{Map, Value};

pub mod tags;

pub const INTERRUPT_MARKER: &str = "[Request interrupted by user]";

const USER_ATTRIBUTES: &[&str] = &[
    "type",
    "uuid",
    "parentUuid",
    "timestamp",
    "sessionId",
    "message",
    "cwd",
    "version",
    "gitBranch",
    "slug",
    "isSidechain",
    "userType",
    "isMeta",
    "thinkingMetadata",
    "toolUseResult",
    "todos",
];

const ASSISTANT_ATTRIBUTES: &[&str] = &[
    "type",
    "uuid",
    "parentUuid",
    "timestamp",
    "sessionId",
    "message",
    "cwd",
    "version",
    "gitBranch",
    "slug",
    "isSidechain",
    "userType",
    "requestId",
];

const SUMMARY_ATTRIBUTES: &[&str] = &["type", "summary", "leafUuid"];

/// Bookkeeping line types that never reach the record stream and never warn.
const DROPPED_TYPES: &[&str] = &["file-history-snapshot", "system", "progress"];

/// Commands dropped from the record stream unless configured otherwise.
pub const DEFAULT_HIDDEN_COMMANDS: &[&str] =
    &["/clear", "/resume", "/context", "/release-notes", "/usage"];

#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Accepted on every record kind in addition to the built-in sets.
    pub extra_expected_attributes: Vec<String>,
    /// Command names (`/clear`) kept out of the record stream.
    pub hidden_commands: Vec<String>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            extra_expected_attributes: Vec::new(),
            hidden_commands: default_hidden_commands(),
        }
    }
}

pub fn default_hidden_commands() -> Vec<String> {
    DEFAULT_HIDDEN_COMMANDS
        .iter()
        .map(|c| c.to_string())
        .collect()
}

impl ParserOptions {
    fn is_hidden_command(&self, name: Option<&str>) -> bool {
        name.is_some_and(|n| self.hidden_commands.iter().any(|h| h == n))
    }

    fn is_expected(&self, known: &[&str], key: &str) -> bool {
        known.contains(&key) || self.extra_expected_attributes.iter().any(|k| k == key)
    }
}

/// Parses every line of one session log. A malformed line aborts the whole file.
pub fn parse_file(path: &Path, options: &ParserOptions) -> Result<ParsedFile, ParseError> {
    let file = adapter_common::file_name(path);
    let lines = adapter_common::read_jsonl(path)?;
    let mut parsed = ParsedFile::new(file.clone());
    for (line, value) in lines {
        let (outcome, warnings) = parse_line(value, Origin::new(file.clone(), line), options);
        parsed.warnings.extend(warnings);
        parsed.push(outcome);
    }
    tracing::debug!(
        file = %file,
        records = parsed.records.len(),
        summaries = parsed.summaries.len(),
        warnings = parsed.warnings.len(),
        "parsed session file"
    );
    Ok(parsed)
}

/// Turns one JSON value into its line outcome plus any record-level warnings.
pub fn parse_line(
    value: Value,
    origin: Origin,
    options: &ParserOptions,
) -> (ParsedLine, Vec<Warning>) {
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return (
                ParsedLine::Unknown(UnknownRecord {
                    type_tag: String::new(),
                    origin,
                    raw: other,
                }),
                Vec::new(),
            );
        }
    };
    let type_tag = obj
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match type_tag.as_str() {
        "user" => parse_user(obj, origin, options),
        "assistant" => parse_assistant(obj, origin, options),
        "summary" => parse_summary(obj, origin, options),
        t if DROPPED_TYPES.contains(&t) => (dropped(&obj, origin, &type_tag), Vec::new()),
        _ => (
            ParsedLine::Unknown(UnknownRecord {
                type_tag,
                origin,
                raw: Value::Object(obj),
            }),
            Vec::new(),
        ),
    }
}

fn dropped(obj: &Map<String, Value>, origin: Origin, type_tag: &str) -> ParsedLine {
    match str_field(obj, "uuid") {
        Some(id) => ParsedLine::Hidden(HiddenRecord {
            id,
            parent_id: str_field(obj, "parentUuid"),
            origin,
            reason: HiddenReason::Dropped {
                type_tag: type_tag.to_string(),
            },
        }),
        None => ParsedLine::Ignored,
    }
}

fn parse_user(
    obj: Map<String, Value>,
    origin: Origin,
    options: &ParserOptions,
) -> (ParsedLine, Vec<Warning>) {
    let mut warnings = unexpected_attributes(&obj, USER_ATTRIBUTES, &origin, options);
    let Some(id) = str_field(&obj, "uuid") else {
        warnings.push(missing_uuid(&obj, &origin));
        return (ParsedLine::Ignored, warnings);
    };
    let parent_id = str_field(&obj, "parentUuid");
    let content = obj.get("message").and_then(|m| m.get("content"));

    if obj.get("isMeta").and_then(Value::as_bool) == Some(true) {
        let text = adapter_common::first_text_block(content);
        return (
            ParsedLine::Hidden(HiddenRecord {
                id,
                parent_id,
                origin,
                reason: HiddenReason::Meta { text },
            }),
            warnings,
        );
    }

    let kind = match content {
        Some(Value::String(text)) if tags::is_stdout(text) => {
            return (
                ParsedLine::Hidden(HiddenRecord {
                    id,
                    parent_id,
                    origin,
                    reason: HiddenReason::CommandStdout {
                        text: tags::stdout_text(text),
                    },
                }),
                warnings,
            );
        }
        Some(Value::String(text)) if tags::is_command(text) => {
            let command = tags::command_tags(text);
            if options.is_hidden_command(command.name.as_deref()) {
                return (
                    ParsedLine::Hidden(HiddenRecord {
                        id,
                        parent_id,
                        origin,
                        reason: HiddenReason::HiddenCommand {
                            name: command.name.unwrap_or_default(),
                        },
                    }),
                    warnings,
                );
            }
            RecordKind::BuiltInCommand(BuiltInCommand {
                command,
                stdout: None,
            })
        }
        Some(Value::String(text)) => RecordKind::UserMessage(UserMessage {
            content: UserContent::Text { text: text.clone() },
        }),
        Some(Value::Array(blocks)) => {
            let content = classify_blocks(blocks);
            if content == UserContent::Unknown {
                warnings.push(
                    Warning::at(
                        WarningKind::UnexpectedContentShape,
                        format!(
                            "unexpected user message content array: size={}",
                            blocks.len()
                        ),
                        &origin,
                    )
                    .with_raw(Value::Object(obj.clone())),
                );
            }
            RecordKind::UserMessage(UserMessage { content })
        }
        other => {
            warnings.push(
                Warning::at(
                    WarningKind::UnexpectedContentShape,
                    format!(
                        "unexpected user message content type: {}",
                        json_type_name(other)
                    ),
                    &origin,
                )
                .with_raw(Value::Object(obj.clone())),
            );
            RecordKind::UserMessage(UserMessage {
                content: UserContent::Unknown,
            })
        }
    };

    (
        ParsedLine::Record(record(obj, id, parent_id, origin, kind)),
        warnings,
    )
}

fn classify_blocks(blocks: &[Value]) -> UserContent {
    let [block] = blocks else {
        return UserContent::Unknown;
    };
    match block.get("type").and_then(Value::as_str) {
        Some("tool_result") => UserContent::ToolResult {
            tool_use_id: block
                .get("tool_use_id")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        },
        Some("text") if block.get("text").and_then(Value::as_str) == Some(INTERRUPT_MARKER) => {
            UserContent::Interrupt
        }
        _ => UserContent::Unknown,
    }
}

fn parse_assistant(
    obj: Map<String, Value>,
    origin: Origin,
    options: &ParserOptions,
) -> (ParsedLine, Vec<Warning>) {
    let mut warnings = unexpected_attributes(&obj, ASSISTANT_ATTRIBUTES, &origin, options);
    let Some(id) = str_field(&obj, "uuid") else {
        warnings.push(missing_uuid(&obj, &origin));
        return (ParsedLine::Ignored, warnings);
    };
    let parent_id = str_field(&obj, "parentUuid");
    let message = obj.get("message");
    let model = message
        .and_then(|m| m.get("model"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    let tool_calls = message
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
                .filter_map(|b| {
                    Some(ToolCall {
                        id: b.get("id").and_then(Value::as_str)?.to_string(),
                        name: b.get("name").and_then(Value::as_str).map(ToOwned::to_owned),
                        input: b.get("input").cloned().unwrap_or(Value::Null),
                        result: None,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let kind = RecordKind::AssistantMessage(AssistantMessage { model, tool_calls });
    (
        ParsedLine::Record(record(obj, id, parent_id, origin, kind)),
        warnings,
    )
}

fn parse_summary(
    obj: Map<String, Value>,
    origin: Origin,
    options: &ParserOptions,
) -> (ParsedLine, Vec<Warning>) {
    let mut warnings = unexpected_attributes(&obj, SUMMARY_ATTRIBUTES, &origin, options);
    let Some(leaf_id) = str_field(&obj, "leafUuid") else {
        warnings.push(
            Warning::at(
                WarningKind::UnexpectedContentShape,
                "summary has no leafUuid",
                &origin,
            )
            .with_raw(Value::Object(obj)),
        );
        return (ParsedLine::Ignored, warnings);
    };
    let text = str_field(&obj, "summary").unwrap_or_default();
    (
        ParsedLine::Summary(Summary {
            text,
            leaf_id,
            origin,
            raw: obj,
        }),
        warnings,
    )
}

fn record(
    raw: Map<String, Value>,
    id: String,
    parent_id: Option<String>,
    origin: Origin,
    kind: RecordKind,
) -> Record {
    let timestamp = raw
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(adapter_common::parse_ts);
    Record {
        id,
        parent_id,
        origin,
        timestamp,
        raw,
        kind,
    }
}

fn unexpected_attributes(
    obj: &Map<String, Value>,
    known: &[&str],
    origin: &Origin,
    options: &ParserOptions,
) -> Vec<Warning> {
    let unexpected: Vec<&str> = obj
        .keys()
        .map(String::as_str)
        .filter(|k| !options.is_expected(known, k))
        .collect();
    if unexpected.is_empty() {
        return Vec::new();
    }
    vec![
        Warning::at(
            WarningKind::UnexpectedAttributes,
            format!("unexpected attributes: {}", unexpected.join(", ")),
            origin,
        )
        .with_raw(Value::Object(obj.clone())),
    ]
}

fn missing_uuid(obj: &Map<String, Value>, origin: &Origin) -> Warning {
    Warning::at(
        WarningKind::UnexpectedContentShape,
        "message record has no uuid",
        origin,
    )
    .with_raw(Value::Object(obj.clone()))
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(ToOwned::to_owned)
}

fn json_type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "missing",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "bool",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}
