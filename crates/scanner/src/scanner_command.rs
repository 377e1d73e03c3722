#![forbid(unsafe_code)]

use crate::command::{BackgroundCommand, Callback, CommandOutput, CommandState, Invocation};
use crate::error::Error;
use crate::path::{ExecutablePath, validate};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File a successful scan leaves in the scanner's working directory.
pub const DATA_FILE_NAME: &str = "data.fpm";

/// A [`BackgroundCommand`] bound to the scanner binary.
///
/// The invocation is always `[path] + params`. The binary must exist when
/// the command is built; [`scan`](Self::scan) and [`compare`](Self::compare)
/// additionally run it through [`validate`].
#[derive(Debug)]
pub struct ScannerCommand {
    command: BackgroundCommand,
    workdir: Option<PathBuf>,
}

impl ScannerCommand {
    pub fn new<I, S>(
        path: impl AsRef<Path>,
        params: I,
        timeout: Option<Duration>,
        callback: Option<Callback>,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingBinary(path.to_owned()));
        }

        let mut command = BackgroundCommand::new(Invocation::new(path).args(params));
        if let Some(timeout) = timeout {
            command = command.timeout(timeout);
        }
        if let Some(callback) = callback {
            command.set_callback(callback);
        }
        Ok(Self {
            command,
            workdir: None,
        })
    }

    /// `<path> -s`, run inside `workdir` (or the current directory).
    pub fn scan(
        path: impl AsRef<Path>,
        workdir: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let command = Self::new(launchable(path.as_ref())?, ["-s"], timeout, None)?;
        Ok(match workdir {
            Some(dir) => command.in_dir(dir),
            None => command,
        })
    }

    /// `<path> -c -i <stored_file>`, comparing a fresh scan with a stored one.
    pub fn compare(
        path: impl AsRef<Path>,
        stored_file: impl AsRef<Path>,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let params = [
            OsString::from("-c"),
            OsString::from("-i"),
            stored_file.as_ref().as_os_str().to_owned(),
        ];
        Self::new(launchable(path.as_ref())?, params, timeout, None)
    }

    /// Run the scanner inside `dir`.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.command = self.command.current_dir(dir.clone());
        self.workdir = Some(dir);
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce(&CommandOutput) + Send + 'static) -> Self {
        self.command = self.command.on_complete(callback);
        self
    }

    /// Where a successful scan writes its data.
    pub fn data_file(&self) -> PathBuf {
        self.workdir
            .as_deref()
            .unwrap_or(Path::new("."))
            .join(DATA_FILE_NAME)
    }

    pub fn start(&self) -> Result<(), Error> {
        self.command.start()
    }

    pub async fn wait(&self) -> Result<CommandOutput, Error> {
        self.command.wait().await
    }

    pub async fn wait_checked(&self) -> Result<CommandOutput, Error> {
        self.command.wait_checked().await
    }

    pub fn blocking_wait(&self) -> Result<CommandOutput, Error> {
        self.command.blocking_wait()
    }

    pub fn kill(&self) -> bool {
        self.command.kill()
    }

    pub fn state(&self) -> CommandState {
        self.command.state()
    }

    pub fn is_killed(&self) -> bool {
        self.command.is_killed()
    }

    pub fn output(&self) -> Option<CommandOutput> {
        self.command.output()
    }

    pub fn as_command(&self) -> &BackgroundCommand {
        &self.command
    }
}

/// A missing binary is reported as such, anything else goes through the
/// path validator before it may be launched.
fn launchable(path: &Path) -> Result<ExecutablePath, Error> {
    if !path.exists() {
        return Err(Error::MissingBinary(path.to_owned()));
    }
    validate(Some(path))
}
