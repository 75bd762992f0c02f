use std::{
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Fatal for one file only: the file contributes nothing, other files carry on.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid UTF-8 in {} at line {line}", path.display())]
    InvalidUtf8 { path: PathBuf, line: usize },

    #[error("Malformed JSON at line {line} in {}: {message}", path.display())]
    MalformedJson {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl ParseError {
    pub fn path(&self) -> &Path {
        match self {
            ParseError::Io { path, .. }
            | ParseError::InvalidUtf8 { path, .. }
            | ParseError::MalformedJson { path, .. } => path,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Io { .. } => None,
            ParseError::InvalidUtf8 { line, .. } | ParseError::MalformedJson { line, .. } => {
                Some(*line)
            }
        }
    }
}

/// A session log on disk, as seen when the project directory was listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub len: u64,
}

impl SourceFile {
    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

pub fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Lists `*.<ext>` files directly inside `dir` in scan order: most recently
/// modified first, ties broken by file name. Zero-byte files are skipped, and
/// `agent-*` files too when `exclude_agent_files` is set.
pub fn list_source_files(
    dir: &Path,
    ext: &str,
    exclude_agent_files: bool,
) -> std::io::Result<Vec<SourceFile>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let name = file_name(&path);
        if meta.len() == 0 {
            tracing::debug!(file = %name, "skipping empty file");
            continue;
        }
        if exclude_agent_files && name.starts_with("agent-") {
            tracing::debug!(file = %name, "skipping agent file");
            continue;
        }
        out.push(SourceFile {
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            len: meta.len(),
            path,
        });
    }
    sort_scan_order(&mut out);
    Ok(out)
}

pub fn sort_scan_order(files: &mut [SourceFile]) {
    files.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });
}

/// Reads a JSONL file into `(line_number, value)` pairs, 1-based.
/// Blank lines are skipped; the first line that is not valid JSON aborts the file.
pub fn read_jsonl(path: &Path) -> Result<Vec<(usize, Value)>, ParseError> {
    let file = fs::File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| match source.kind() {
            std::io::ErrorKind::InvalidData => ParseError::InvalidUtf8 {
                path: path.to_path_buf(),
                line: line_no,
            },
            _ => ParseError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(&line).map_err(|e| ParseError::MalformedJson {
                path: path.to_path_buf(),
                line: line_no,
                message: e.to_string(),
            })?;
        out.push((line_no, value));
    }
    Ok(out)
}

pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// First `{"type":"text"}` block of a content array.
pub fn first_text_block(content: Option<&Value>) -> Option<String> {
    content?
        .as_array()?
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}
