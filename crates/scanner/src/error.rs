#![forbid(unsafe_code)]

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Why a candidate executable path was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPathReason {
    Missing,
    Empty,
    ForbiddenCharacter(char),
    NotFound,
    Directory,
    NotExecutable,
}

impl fmt::Display for InvalidPathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("no path given"),
            Self::Empty => f.write_str("path is empty"),
            Self::ForbiddenCharacter(c) => write!(f, "forbidden character {c:?}"),
            Self::NotFound => f.write_str("no such file"),
            Self::Directory => f.write_str("is a directory"),
            Self::NotExecutable => f.write_str("not executable"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid executable path {path:?}: {reason}")]
    InvalidPath {
        path: PathBuf,
        reason: InvalidPathReason,
    },

    #[error("Scanner binary not found: {0:?}")]
    MissingBinary(PathBuf),

    #[error("Failed to start {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Command failed with exit code {code}: {stderr}")]
    ScanFailure { code: i32, stderr: String },

    #[error("Command killed after {timeout:?}")]
    Killed { timeout: Option<Duration> },

    #[error("Command was already started")]
    AlreadyStarted,

    #[error("Background commands need a Tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("Command supervisor went away before completion")]
    SupervisorGone,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_path(path: impl Into<PathBuf>, reason: InvalidPathReason) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    /// `true` for the "cannot find or execute the binary" class of failures.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidPath { .. } | Self::MissingBinary(_))
    }
}
