use std::path::PathBuf;

use thiserror::Error;

/// Lookup failures surfaced to callers of [`crate::History`].
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no project matches '{query}'")]
    NoProject { query: String },

    #[error("ambiguous project '{query}', matches: {}", matches.join(", "))]
    AmbiguousProject { query: String, matches: Vec<String> },

    #[error("no session matches '{query}'")]
    NoSession { query: String },

    #[error("ambiguous session '{query}', matches: {}", matches.join(", "))]
    AmbiguousSession { query: String, matches: Vec<String> },

    #[error("projects directory not found: {}", path.display())]
    ProjectsDirMissing { path: PathBuf },
}
