#![forbid(unsafe_code)]

//! Synchronous, run-to-completion invocations of the scanner binary.

use crate::error::Error;
use crate::path::validate;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use tracing::debug;

/// Status line printed by the detector when no reader is attached.
pub const NO_SCANNERS_SENTINEL: &str = "0";

/// Result of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or the negated signal number if the process died from one.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    status.code().unwrap_or(-1)
}

/// Run `path` with `args` and block until it exits, capturing its output.
///
/// There is no timeout. Use [`crate::BackgroundCommand`] for anything that
/// may hang.
pub fn run<S: AsRef<OsStr>>(path: impl AsRef<Path>, args: &[S]) -> Result<ProcessOutput, Error> {
    let path = path.as_ref();
    let output = Command::new(path)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| Error::Spawn {
            program: path.to_owned(),
            source: Arc::new(err),
        })?;

    Ok(ProcessOutput {
        code: exit_code(output.status),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Ask the scanner binary at `path` for attached fingerprint readers.
///
/// An invalid path is an error; a detector that fails or reports no readers
/// yields an empty list.
pub fn detect_scanners(path: impl AsRef<Path>) -> Result<Vec<String>, Error> {
    let binary = validate(Some(path.as_ref()))?;
    let output = run::<&str>(&binary, &[])?;
    if !output.success() {
        debug!(code = output.code, stderr = %output.stderr, "scanner detection failed");
        return Ok(Vec::new());
    }
    let scanners = parse_detection(&output.stdout);
    debug!(?scanners, "scanners detected");
    Ok(scanners)
}

/// Extract reader names from the detector's standard output.
///
/// Output is either the single status line `0`, or one unindented name line
/// per reader followed by an indented capability line. Only the name lines
/// are returned, in order. The sentinel is matched exactly: `"0\n"` or `"0"`
/// and nothing else.
pub fn parse_detection(stdout: &str) -> Vec<String> {
    let status_line = stdout.strip_suffix('\n').unwrap_or(stdout);
    if status_line == NO_SCANNERS_SENTINEL {
        return Vec::new();
    }
    stdout
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with(char::is_whitespace))
        .map(str::to_owned)
        .collect()
}
