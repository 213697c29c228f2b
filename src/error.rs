use std::path::PathBuf;

use thiserror::Error;

/// Failures returned to the caller before (or instead of) a long-running operation.
///
/// Per-item problems during a scan or cleanup never take this route; they are
/// collected into the result structures instead.
#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("invalid scan root {path:?}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("invalid cleaning rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("size cache error: {0}")]
    Cache(String),

    #[error("a {0} operation is already running")]
    Busy(&'static str),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("{name} failed: {message}")]
    Collaborator { name: &'static str, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CleanerError {
    pub(crate) fn invalid_root(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CleanerError::InvalidRoot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        CleanerError::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = CleanerError> = std::result::Result<T, E>;
