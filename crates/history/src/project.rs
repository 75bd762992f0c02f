use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use adapter_common::ParseError;
use anyhow::Context;
use chrono::{DateTime, Utc};
use claude::ParserOptions;
use rayon::prelude::*;

use crate::{assembler, error::HistoryError, session::Session};

/// One directory of session logs. Files are read and assembled on first
/// access and cached for the lifetime of the value.
#[derive(Debug)]
pub struct Project {
    pub id: String,
    pub path: PathBuf,
    options: ParserOptions,
    exclude_agent_files: bool,
    cache: OnceLock<ProjectData>,
}

#[derive(Debug)]
struct ProjectData {
    sessions: Vec<Session>,
    file_errors: Vec<ParseError>,
}

impl Project {
    pub fn new(path: impl Into<PathBuf>, options: ParserOptions, exclude_agent_files: bool) -> Self {
        let path = path.into();
        Self {
            id: adapter_common::file_name(&path),
            path,
            options,
            exclude_agent_files,
            cache: OnceLock::new(),
        }
    }

    /// Sessions in order of their root's first appearance in scan order.
    pub fn sessions(&self) -> anyhow::Result<&[Session]> {
        Ok(&self.data()?.sessions)
    }

    /// Files that failed to parse and were left out of every session.
    pub fn file_errors(&self) -> anyhow::Result<&[ParseError]> {
        Ok(&self.data()?.file_errors)
    }

    /// `None` when `id` names no root file, e.g. a summary-only or
    /// continuation file. With several roots in one file the first is returned.
    pub fn session(&self, id: &str) -> anyhow::Result<Option<&Session>> {
        Ok(self.sessions()?.iter().find(|s| s.id == id))
    }

    pub fn sessions_by_recency(&self) -> anyhow::Result<Vec<&Session>> {
        let mut sessions: Vec<&Session> = self.sessions()?.iter().collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.last_updated_at()));
        Ok(sessions)
    }

    pub fn last_updated_at(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(self
            .sessions()?
            .iter()
            .filter_map(Session::last_updated_at)
            .max())
    }

    /// Exact session id, or else the single session id starting with `query`.
    pub fn resolve_session_id(&self, query: &str) -> anyhow::Result<String> {
        let sessions = self.sessions()?;
        if sessions.iter().any(|s| s.id == query) {
            return Ok(query.to_string());
        }
        let mut matches: Vec<String> = sessions
            .iter()
            .filter(|s| s.id.starts_with(query))
            .map(|s| s.id.clone())
            .collect();
        matches.sort();
        matches.dedup();
        match matches.len() {
            0 => Err(HistoryError::NoSession {
                query: query.to_string(),
            }
            .into()),
            1 => Ok(matches.remove(0)),
            _ => Err(HistoryError::AmbiguousSession {
                query: query.to_string(),
                matches,
            }
            .into()),
        }
    }

    fn data(&self) -> anyhow::Result<&ProjectData> {
        if let Some(data) = self.cache.get() {
            return Ok(data);
        }
        let data = load(&self.path, &self.options, self.exclude_agent_files)?;
        Ok(self.cache.get_or_init(move || data))
    }
}

fn load(dir: &Path, options: &ParserOptions, exclude_agent_files: bool) -> anyhow::Result<ProjectData> {
    let files = adapter_common::list_source_files(dir, "jsonl", exclude_agent_files)
        .with_context(|| format!("failed to list project directory {}", dir.display()))?;
    tracing::debug!(project = %dir.display(), files = files.len(), "scanning project");

    let results: Vec<_> = files
        .par_iter()
        .map(|file| claude::parse_file(&file.path, options))
        .collect();

    let mut parsed = Vec::with_capacity(results.len());
    let mut file_errors = Vec::new();
    for result in results {
        match result {
            Ok(file) => parsed.push(file),
            Err(err) => {
                tracing::warn!(path = %err.path().display(), line = ?err.line(), error = %err, "skipping unreadable session file");
                file_errors.push(err);
            }
        }
    }

    let sessions = assembler::assemble(parsed);
    tracing::debug!(project = %dir.display(), sessions = sessions.len(), "project loaded");
    Ok(ProjectData {
        sessions,
        file_errors,
    })
}
