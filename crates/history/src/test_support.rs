use claude::ParserOptions;
use core_model::{Origin, ParsedFile};
use serde_json::{Value, json};

use crate::session::Session;

pub fn parsed(name: &str, lines: &[Value]) -> ParsedFile {
    let mut file = ParsedFile::new(name);
    for (i, value) in lines.iter().enumerate() {
        let (line, warnings) =
            claude::parse_line(value.clone(), Origin::new(name, i + 1), &ParserOptions::default());
        file.warnings.extend(warnings);
        file.push(line);
    }
    file
}

/// Assembles one file that is expected to hold exactly one session.
pub fn session(lines: &[Value]) -> Session {
    let mut sessions = crate::assemble(vec![parsed("test.jsonl", lines)]);
    assert_eq!(sessions.len(), 1);
    sessions.remove(0)
}

pub fn user(id: &str, parent: Option<&str>) -> Value {
    json!({"type": "user", "uuid": id, "parentUuid": parent, "message": {"role": "user", "content": format!("message {id}")}})
}

pub fn assistant(id: &str, parent: &str) -> Value {
    json!({"type": "assistant", "uuid": id, "parentUuid": parent, "message": {"role": "assistant", "content": []}})
}

pub fn at(mut line: Value, ts: &str) -> Value {
    line["timestamp"] = json!(ts);
    line
}

pub fn summary(leaf: &str, text: &str) -> Value {
    json!({"type": "summary", "summary": text, "leafUuid": leaf})
}
