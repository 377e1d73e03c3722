#![forbid(unsafe_code)]

//! Supervision of long running external commands.
//!
//! A [`BackgroundCommand`] owns one child process. Starting it hands the
//! child to a supervisor task on the Tokio runtime which races three
//! events: the child exiting, the optional watchdog timer, and an
//! out-of-band kill request. Exactly one of them ends the execution; the
//! completion callback runs once, after the child is gone and the watchdog
//! has been dropped, and before waiters are released.

mod capture;

use crate::error::Error;
use crate::process::exit_code;
use capture::Capture;
use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Return code reported for a command that was killed.
pub const KILLED_RETURN_CODE: i32 = -9;

/// How long output readers may keep draining after a kill.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Completion callback. Invoked once per execution that actually ran.
pub type Callback = Box<dyn FnOnce(&CommandOutput) + Send + 'static>;

/// Program and arguments of one command. No shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }
}

/// What a finished execution left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, negated signal number, or [`KILLED_RETURN_CODE`].
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Set when the execution was ended by a kill. Output is then whatever
    /// the child flushed before it died, possibly nothing.
    pub killed: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.killed && self.code == 0
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// A kill becomes [`Error::Killed`], a non-zero exit [`Error::ScanFailure`].
    pub fn into_result(self) -> Result<Self, Error> {
        if self.killed {
            return Err(Error::Killed { timeout: None });
        }
        if self.code != 0 {
            return Err(Error::ScanFailure {
                code: self.code,
                stderr: self.stderr_lossy().trim_end().to_owned(),
            });
        }
        Ok(self)
    }
}

/// Lifecycle of a [`BackgroundCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Created,
    Running,
    Completed,
    Killed,
    /// The process could not be started at all.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KillCause {
    Timeout,
    Aborted,
}

#[derive(Debug, Clone)]
enum Status {
    Created,
    Running { pid: Option<u32> },
    Completed(Arc<CommandOutput>),
    Killed(Arc<CommandOutput>, KillCause),
    Failed(Arc<std::io::Error>),
}

impl Status {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed(_) | Self::Killed(..) | Self::Failed(_)
        )
    }

    fn output(&self) -> Option<&Arc<CommandOutput>> {
        match self {
            Self::Completed(output) | Self::Killed(output, _) => Some(output),
            _ => None,
        }
    }

    fn state(&self) -> CommandState {
        match self {
            Self::Created => CommandState::Created,
            Self::Running { .. } => CommandState::Running,
            Self::Completed(_) => CommandState::Completed,
            Self::Killed(..) => CommandState::Killed,
            Self::Failed(_) => CommandState::Failed,
        }
    }
}

struct Shared {
    status: watch::Sender<Status>,
    callback: Mutex<Option<Callback>>,
    cancel: CancellationToken,
}

impl Shared {
    /// Run the callback, then publish the terminal status.
    fn finish(&self, status: Status) {
        let callback = match self.callback.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let (Some(callback), Some(output)) = (callback, status.output()) {
            callback(&**output);
        }
        self.status.send_replace(status);
    }
}

enum Ending {
    Exited(std::io::Result<std::process::ExitStatus>),
    Killed(KillCause),
}

/// One supervised run of an external command.
///
/// ```no_run
/// # async fn demo() -> Result<(), scanner::Error> {
/// use scanner::{BackgroundCommand, Invocation};
/// use std::time::Duration;
///
/// let command = BackgroundCommand::new(Invocation::new("/usr/bin/fpscan").arg("-s"))
///     .timeout(Duration::from_secs(30));
/// command.start()?;
/// let output = command.wait().await?;
/// println!("exit code {}", output.code);
/// # Ok(())
/// # }
/// ```
pub struct BackgroundCommand {
    invocation: Invocation,
    timeout: Option<Duration>,
    current_dir: Option<PathBuf>,
    shared: Arc<Shared>,
}

impl BackgroundCommand {
    pub fn new(invocation: Invocation) -> Self {
        let (status, _) = watch::channel(Status::Created);
        Self {
            invocation,
            timeout: None,
            current_dir: None,
            shared: Arc::new(Shared {
                status,
                callback: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Kill the process if it is still running after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `callback` once the process has terminated, naturally or killed.
    pub fn on_complete(self, callback: impl FnOnce(&CommandOutput) + Send + 'static) -> Self {
        self.set_callback(Box::new(callback));
        self
    }

    pub(crate) fn set_callback(&self, callback: Callback) {
        match self.shared.callback.lock() {
            Ok(mut guard) => *guard = Some(callback),
            Err(poisoned) => *poisoned.into_inner() = Some(callback),
        }
    }

    /// Working directory of the child process.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn configured_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Spawn the process and hand it to a supervisor task.
    ///
    /// Must be called from within a Tokio runtime. Spawning happens before
    /// this returns, so a binary that cannot be executed is reported here as
    /// [`Error::Spawn`] and the command moves to [`CommandState::Failed`].
    /// A command can be started once.
    pub fn start(&self) -> Result<(), Error> {
        let runtime = Handle::try_current()?;
        let claimed = self.shared.status.send_if_modified(|status| {
            if matches!(status, Status::Created) {
                *status = Status::Running { pid: None };
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(Error::AlreadyStarted);
        }

        let mut command = Command::new(&self.invocation.program);
        command
            .args(&self.invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a kill also reaches anything the child forked.
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let err = Arc::new(err);
                warn!(program = ?self.invocation.program, %err, "failed to spawn command");
                self.shared.status.send_replace(Status::Failed(Arc::clone(&err)));
                return Err(Error::Spawn {
                    program: self.invocation.program.clone(),
                    source: err,
                });
            }
        };

        let pid = child.id();
        debug!(program = ?self.invocation.program, ?pid, timeout = ?self.timeout, "command spawned");
        self.shared.status.send_replace(Status::Running { pid });
        runtime.spawn(supervise(child, self.timeout, Arc::clone(&self.shared)));
        Ok(())
    }

    /// Wait until the command has terminated and return its output.
    ///
    /// May be called any number of times, also before [`start`](Self::start)
    /// from another task. Every call returns the same output. A command that
    /// failed to spawn yields [`Error::Spawn`].
    pub async fn wait(&self) -> Result<CommandOutput, Error> {
        let mut rx = self.shared.status.subscribe();
        let status = rx
            .wait_for(Status::is_terminal)
            .await
            .map_err(|_| Error::SupervisorGone)?
            .clone();
        match status {
            Status::Completed(output) | Status::Killed(output, _) => Ok((*output).clone()),
            Status::Failed(err) => Err(Error::Spawn {
                program: self.invocation.program.clone(),
                source: err,
            }),
            Status::Created | Status::Running { .. } => Err(Error::SupervisorGone),
        }
    }

    /// Like [`wait`](Self::wait), but turns a kill into [`Error::Killed`] and
    /// a non-zero exit code into [`Error::ScanFailure`].
    pub async fn wait_checked(&self) -> Result<CommandOutput, Error> {
        let output = self.wait().await?;
        let timed_out = matches!(
            &*self.shared.status.borrow(),
            Status::Killed(_, KillCause::Timeout)
        );
        if timed_out {
            return Err(Error::Killed {
                timeout: self.timeout,
            });
        }
        output.into_result()
    }

    /// Block the current thread until the command has terminated.
    ///
    /// For callers outside the runtime. Calling this from an async context
    /// stalls the executor thread.
    pub fn blocking_wait(&self) -> Result<CommandOutput, Error> {
        futures::executor::block_on(self.wait())
    }

    /// Kill a running command out of band.
    ///
    /// Takes the same path as the watchdog. Returns `false` if the command is
    /// not running, in which case nothing happens.
    pub fn kill(&self) -> bool {
        if !matches!(*self.shared.status.borrow(), Status::Running { .. }) {
            return false;
        }
        info!(program = ?self.invocation.program, "kill requested");
        self.shared.cancel.cancel();
        true
    }

    pub fn state(&self) -> CommandState {
        self.shared.status.borrow().state()
    }

    pub fn pid(&self) -> Option<u32> {
        match *self.shared.status.borrow() {
            Status::Running { pid } => pid,
            _ => None,
        }
    }

    /// Output of a finished command, `None` while it has not terminated.
    pub fn output(&self) -> Option<CommandOutput> {
        self.shared
            .status
            .borrow()
            .output()
            .map(|output| (**output).clone())
    }

    pub fn return_code(&self) -> Option<i32> {
        self.shared.status.borrow().output().map(|output| output.code)
    }

    pub fn is_killed(&self) -> bool {
        matches!(*self.shared.status.borrow(), Status::Killed(..))
    }
}

impl fmt::Debug for BackgroundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundCommand")
            .field("invocation", &self.invocation)
            .field("timeout", &self.timeout)
            .field("current_dir", &self.current_dir)
            .field("state", &self.state())
            .finish()
    }
}

async fn supervise(mut child: Child, timeout: Option<Duration>, shared: Arc<Shared>) {
    // Kept for the group kill, the child forgets it once reaped.
    let pid = child.id();
    let mut stdout = Capture::spawn(child.stdout.take());
    let mut stderr = Capture::spawn(child.stderr.take());

    let watchdog = async move {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(watchdog);

    let ending = tokio::select! {
        status = child.wait() => Ending::Exited(status),
        () = &mut watchdog => Ending::Killed(KillCause::Timeout),
        () = shared.cancel.cancelled() => Ending::Killed(KillCause::Aborted),
    };

    // Anything the child forked may still hold the pipes open, so the
    // watchdog stays armed until both reach end of file.
    let ending = match ending {
        Ending::Exited(Ok(status)) => tokio::select! {
            _ = async { tokio::join!(stdout.finished(), stderr.finished()) } => {
                Ending::Exited(Ok(status))
            }
            () = &mut watchdog => Ending::Killed(KillCause::Timeout),
            () = shared.cancel.cancelled() => Ending::Killed(KillCause::Aborted),
        },
        other => other,
    };

    let status = match ending {
        Ending::Exited(Ok(status)) => {
            let (stdout, stderr) = tokio::join!(stdout.collect(), stderr.collect());
            let code = exit_code(status);
            debug!(code, "command completed");
            Status::Completed(Arc::new(CommandOutput {
                code,
                stdout,
                stderr,
                killed: false,
            }))
        }
        Ending::Exited(Err(err)) => {
            warn!(%err, "lost track of command, killing it");
            kill_and_collect(&mut child, pid, stdout, stderr, KillCause::Aborted).await
        }
        Ending::Killed(cause) => {
            if cause == KillCause::Timeout {
                warn!(?timeout, "command timed out, killing it");
            }
            kill_and_collect(&mut child, pid, stdout, stderr, cause).await
        }
    };

    shared.finish(status);
}

async fn kill_and_collect(
    child: &mut Child,
    pid: Option<u32>,
    stdout: Capture,
    stderr: Capture,
    cause: KillCause,
) -> Status {
    force_kill(child, pid).await;
    let (stdout, stderr) = tokio::join!(
        stdout.collect_within(KILL_GRACE),
        stderr.collect_within(KILL_GRACE)
    );
    Status::Killed(
        Arc::new(CommandOutput {
            code: KILLED_RETURN_CODE,
            stdout,
            stderr,
            killed: true,
        }),
        cause,
    )
}

/// SIGKILL the child's process group, then reap the child.
///
/// The group outlives its leader while forked helpers are alive, so the
/// group is signalled even when the child itself already exited.
async fn force_kill(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, %err, "killpg failed");
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
    if let Err(err) = child.start_kill() {
        debug!(%err, "start_kill failed");
    }
    if let Err(err) = child.wait().await {
        warn!(%err, "failed to reap killed command");
    }
}
