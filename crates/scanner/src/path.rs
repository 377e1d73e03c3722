#![forbid(unsafe_code)]

//! Validation of executable paths before they reach a process launcher.
//!
//! Processes are never started through a shell, but paths end up in log
//! lines and user facing messages that may be pasted into one. Anything
//! outside `[A-Za-z0-9/._-]` is therefore refused outright.

use crate::error::{Error, InvalidPathReason};
use nix::unistd::{AccessFlags, access};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// An absolute path to an existing, executable regular file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutablePath(PathBuf);

impl ExecutablePath {
    /// Validate `path`. See [`validate`].
    pub fn new(path: impl AsRef<Path>) -> Result<Self, Error> {
        validate(Some(path.as_ref()))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for ExecutablePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<OsStr> for ExecutablePath {
    fn as_ref(&self) -> &OsStr {
        self.0.as_os_str()
    }
}

impl fmt::Display for ExecutablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

#[inline]
fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-')
}

/// Check a candidate executable path and return its normalized absolute form.
///
/// Fails with [`Error::InvalidPath`] if the path is absent or empty, contains
/// a character outside `[A-Za-z0-9/._-]` once made absolute, does not exist,
/// is a directory, or is not executable by the current process.
pub fn validate(path: Option<&Path>) -> Result<ExecutablePath, Error> {
    let Some(path) = path else {
        return Err(Error::invalid_path(PathBuf::new(), InvalidPathReason::Missing));
    };
    if path.as_os_str().is_empty() {
        return Err(Error::invalid_path(path, InvalidPathReason::Empty));
    }

    let normalized = normalize(path)?;
    // Non UTF-8 bytes come back as U+FFFD and are rejected with the rest.
    if let Some(c) = normalized.to_string_lossy().chars().find(|c| !is_allowed(*c)) {
        debug!(?path, forbidden = ?c, "rejecting executable path");
        return Err(Error::invalid_path(
            path,
            InvalidPathReason::ForbiddenCharacter(c),
        ));
    }

    let meta = std::fs::metadata(&normalized)
        .map_err(|_| Error::invalid_path(&normalized, InvalidPathReason::NotFound))?;
    if meta.is_dir() {
        return Err(Error::invalid_path(normalized, InvalidPathReason::Directory));
    }
    if !meta.is_file() || access(normalized.as_path(), AccessFlags::X_OK).is_err() {
        return Err(Error::invalid_path(
            normalized,
            InvalidPathReason::NotExecutable,
        ));
    }

    Ok(ExecutablePath(normalized))
}

/// Make `path` absolute and resolve `.` and `..` lexically, without touching
/// symlinks.
fn normalize(path: &Path) -> Result<PathBuf, Error> {
    let joined = if path.is_absolute() {
        path.to_owned()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
