//! Reconstructs Claude conversation history from per-project JSONL logs.
//!
//! A [`History`] lists project directories; a [`Project`] parses its files
//! into [`Session`]s, each a tree of [`Segment`]s from which [`Thread`]s
//! (root-to-leaf paths) are read.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use claude::ParserOptions;
use core_model::{RecordKind, UserContent};
use serde::Serialize;

pub mod assembler;
pub mod config;
pub mod error;
pub mod project;
pub mod segment;
pub mod session;
pub mod thread;

#[cfg(test)]
pub(crate) mod test_support;

pub use assembler::assemble;
pub use config::Config;
pub use error::HistoryError;
pub use project::Project;
pub use segment::Segment;
pub use session::Session;
pub use thread::Thread;

/// The projects directory and the options every project is parsed with.
#[derive(Debug, Clone)]
pub struct History {
    pub projects_path: PathBuf,
    options: ParserOptions,
    exclude_agent_files: bool,
}

/// A thread with activity on a given day.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadActivity {
    pub project_id: String,
    pub session_id: String,
    pub thread_id: String,
    /// User prompts and commands sent that day; may be zero.
    pub user_messages: usize,
    /// Latest message timestamp falling on the day.
    pub last_updated_at: DateTime<Utc>,
}

impl History {
    pub fn new(config: &Config) -> Self {
        Self {
            projects_path: config.projects_path.clone(),
            options: config.parser_options(),
            exclude_agent_files: config.exclude_agent_files,
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        Ok(Self::new(&Config::load()?))
    }

    /// Project directory names, sorted.
    pub fn projects(&self) -> anyhow::Result<Vec<String>> {
        if !self.projects_path.is_dir() {
            return Err(HistoryError::ProjectsDirMissing {
                path: self.projects_path.clone(),
            }
            .into());
        }
        let entries = std::fs::read_dir(&self.projects_path).with_context(|| {
            format!("failed to list projects in {}", self.projects_path.display())
        })?;
        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|e| e.file_name().to_str().map(ToOwned::to_owned))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Exact project id, or else the single project id containing `query`.
    pub fn resolve_project_id(&self, query: &str) -> anyhow::Result<String> {
        let ids = self.projects()?;
        if ids.iter().any(|id| id == query) {
            return Ok(query.to_string());
        }
        let mut matches: Vec<String> = ids.into_iter().filter(|id| id.contains(query)).collect();
        match matches.len() {
            0 => Err(HistoryError::NoProject {
                query: query.to_string(),
            }
            .into()),
            1 => Ok(matches.remove(0)),
            _ => Err(HistoryError::AmbiguousProject {
                query: query.to_string(),
                matches,
            }
            .into()),
        }
    }

    pub fn project(&self, query: &str) -> anyhow::Result<Project> {
        let id = self.resolve_project_id(query)?;
        Ok(Project::new(
            self.projects_path.join(id),
            self.options.clone(),
            self.exclude_agent_files,
        ))
    }

    /// Every thread, across all projects, with a message timestamped on
    /// `date` (UTC), most recent activity that day first.
    pub fn sessions_updated_on(&self, date: NaiveDate) -> anyhow::Result<Vec<ThreadActivity>> {
        let projects = self.projects()?.into_iter().map(|id| {
            Project::new(
                self.projects_path.join(id),
                self.options.clone(),
                self.exclude_agent_files,
            )
        });
        let out = activity_on(projects, date);
        tracing::info!(%date, threads = out.len(), "collected thread activity");
        Ok(out)
    }
}

/// Projects that fail to load are logged and skipped.
fn activity_on(projects: impl IntoIterator<Item = Project>, date: NaiveDate) -> Vec<ThreadActivity> {
    let mut out = Vec::new();
    for project in projects {
        let sessions = match project.sessions() {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::warn!(project = %project.id, error = %err, "skipping unreadable project");
                continue;
            }
        };
        for session in sessions {
            for thread in session.threads() {
                let on_date: Vec<_> = thread
                    .messages()
                    .filter_map(|r| r.timestamp.filter(|t| t.date_naive() == date).map(|t| (r, t)))
                    .collect();
                let Some(latest) = on_date.iter().map(|&(_, t)| t).max() else {
                    continue;
                };
                out.push(ThreadActivity {
                    project_id: project.id.clone(),
                    session_id: session.id.clone(),
                    thread_id: thread.id().to_string(),
                    user_messages: on_date.iter().filter(|(r, _)| is_prompt(&r.kind)).count(),
                    last_updated_at: latest,
                });
            }
        }
    }
    out.sort_by_key(|a| std::cmp::Reverse(a.last_updated_at));
    out
}

fn is_prompt(kind: &RecordKind) -> bool {
    match kind {
        RecordKind::UserMessage(msg) => !matches!(msg.content, UserContent::ToolResult { .. }),
        RecordKind::AssistantMessage(_) => false,
        RecordKind::BuiltInCommand(_) | RecordKind::UserDefinedCommand(_) => true,
    }
}
