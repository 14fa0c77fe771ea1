//! Per-stage failure taxonomy.
//!
//! Every pipeline stage (locate, fetch, rewrite, commit, verify) returns
//! `Result<T, PatchError>`. Only [`PatchError::Fatal`] may change the
//! process exit status; everything else is recorded and the run continues.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatchError {
    /// Something expected was not there: no candidate, no reachable URL,
    /// no marker. A normal outcome.
    #[error("{0}")]
    Absent(String),

    /// An I/O failure isolated to a single path.
    #[error("{path}: {message}")]
    Io { path: PathBuf, message: String },

    /// A mandatory replacement source is unavailable from every location.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl PatchError {
    pub fn absent(msg: impl Into<String>) -> Self {
        PatchError::Absent(msg.into())
    }

    pub fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        PatchError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, PatchError::Fatal(_))
    }
}
