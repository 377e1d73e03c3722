#![forbid(unsafe_code)]

use scanner::{
    BackgroundCommand, CommandOutput, CommandState, Error, Invocation, KILLED_RETURN_CODE,
    ScannerCommand,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn sh(script: &str) -> Invocation {
    Invocation::new("/bin/sh").args(["-c", script])
}

type Seen = Arc<Mutex<Vec<CommandOutput>>>;

/// A callback keeping a copy of every output it is handed.
fn recording_callback() -> (Seen, impl FnOnce(&CommandOutput) + Send + 'static) {
    let seen = Seen::default();
    let sink = Arc::clone(&seen);
    (seen, move |output: &CommandOutput| {
        sink.lock().unwrap().push(output.clone());
    })
}

fn received(seen: &Seen) -> Vec<CommandOutput> {
    seen.lock().unwrap().clone()
}

#[tokio::test]
async fn natural_exit_reports_code_and_output() {
    let (seen, callback) = recording_callback();
    let command =
        BackgroundCommand::new(sh("echo out; echo err >&2; exit 42")).on_complete(callback);

    command.start().unwrap();
    let output = command.wait().await.unwrap();

    assert_eq!(output.code, 42);
    assert_eq!(output.stdout, b"out\n");
    assert_eq!(output.stderr, b"err\n");
    assert_eq!(output.stdout_lossy(), "out\n");
    assert!(!output.killed);
    assert_eq!(command.state(), CommandState::Completed);
    assert_eq!(command.return_code(), Some(42));
    assert_eq!(received(&seen), [output]);
}

#[tokio::test]
async fn wait_is_idempotent() {
    let command = BackgroundCommand::new(sh("echo once"));
    command.start().unwrap();

    let first = command.wait().await.unwrap();
    let second = command.wait().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.stdout, b"once\n");
}

#[tokio::test]
async fn timeout_kills_unresponsive_process() {
    let (seen, callback) = recording_callback();
    let command = BackgroundCommand::new(sh("trap '' TERM INT; sleep 10"))
        .timeout(Duration::from_millis(100))
        .on_complete(callback);

    let started = Instant::now();
    command.start().unwrap();
    let output = command.wait().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(output.killed);
    assert_eq!(output.code, KILLED_RETURN_CODE);
    assert!(command.is_killed());
    assert_eq!(command.state(), CommandState::Killed);

    let seen = received(&seen);
    assert_eq!(seen.len(), 1);
    assert!(seen[0].killed);
    assert_eq!(seen[0].code, KILLED_RETURN_CODE);
}

#[tokio::test]
async fn output_before_kill_is_preserved() {
    let command =
        BackgroundCommand::new(sh("echo started; sleep 10")).timeout(Duration::from_millis(500));
    command.start().unwrap();

    let output = command.wait().await.unwrap();
    assert!(output.killed);
    assert_eq!(output.stdout, b"started\n");
}

#[tokio::test]
async fn timeout_covers_helpers_holding_the_pipes() {
    let (seen, callback) = recording_callback();
    let command = BackgroundCommand::new(sh("echo ready; sleep 4 & exit 0"))
        .timeout(Duration::from_millis(200))
        .on_complete(callback);

    let started = Instant::now();
    command.start().unwrap();
    let output = command.wait().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert!(output.killed);
    assert_eq!(output.code, KILLED_RETURN_CODE);
    assert_eq!(output.stdout, b"ready\n");
    assert!(matches!(
        command.wait_checked().await,
        Err(Error::Killed { timeout: Some(_) })
    ));
    assert_eq!(received(&seen), [output]);
}

#[tokio::test]
async fn kill_reaches_helpers_after_leader_exits() {
    let command = BackgroundCommand::new(sh("sleep 4 & exit 0"));
    command.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(command.state(), CommandState::Running);
    let started = Instant::now();
    assert!(command.kill());
    let output = command.wait().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(output.killed);
    assert_eq!(command.state(), CommandState::Killed);
}

#[tokio::test]
async fn timeout_does_not_fire_after_natural_exit() {
    let (seen, callback) = recording_callback();
    let command = BackgroundCommand::new(sh("exit 0"))
        .timeout(Duration::from_millis(200))
        .on_complete(callback);

    command.start().unwrap();
    let output = command.wait().await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!output.killed);
    assert_eq!(command.state(), CommandState::Completed);
    assert_eq!(received(&seen).len(), 1);
}

#[tokio::test]
async fn out_of_band_kill_aborts_running_command() {
    let (seen, callback) = recording_callback();
    let command = BackgroundCommand::new(sh("sleep 10")).on_complete(callback);
    command.start().unwrap();
    assert_eq!(command.state(), CommandState::Running);
    assert!(command.pid().is_some());

    assert!(command.kill());
    let output = command.wait().await.unwrap();

    assert!(output.killed);
    assert_eq!(command.pid(), None);
    assert!(!command.kill());
    assert!(matches!(
        command.wait_checked().await,
        Err(Error::Killed { timeout: None })
    ));
    assert_eq!(received(&seen).len(), 1);
}

#[tokio::test]
async fn kill_racing_timeout_fires_callback_once() {
    let (seen, callback) = recording_callback();
    let command = BackgroundCommand::new(sh("sleep 10"))
        .timeout(Duration::from_millis(50))
        .on_complete(callback);
    command.start().unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    command.kill();
    command.wait().await.unwrap();

    assert!(command.is_killed());
    assert_eq!(received(&seen).len(), 1);
}

#[tokio::test]
async fn wait_checked_reports_failures() {
    let failing = BackgroundCommand::new(sh("echo 'no finger detected' >&2; exit 1"));
    failing.start().unwrap();
    match failing.wait_checked().await {
        Err(Error::ScanFailure { code, stderr }) => {
            assert_eq!(code, 1);
            assert_eq!(stderr, "no finger detected");
        }
        other => panic!("expected scan failure, got {other:?}"),
    }

    let slow = BackgroundCommand::new(sh("sleep 10")).timeout(Duration::from_millis(100));
    slow.start().unwrap();
    assert!(matches!(
        slow.wait_checked().await,
        Err(Error::Killed { timeout: Some(t) }) if t == Duration::from_millis(100)
    ));
}

#[tokio::test]
async fn spawn_failure_is_not_a_completed_run() {
    let dir = tempdir().unwrap();
    let (seen, callback) = recording_callback();
    let command =
        BackgroundCommand::new(Invocation::new(dir.path().join("missing"))).on_complete(callback);

    assert!(matches!(command.start(), Err(Error::Spawn { .. })));
    assert_eq!(command.state(), CommandState::Failed);
    assert!(matches!(command.wait().await, Err(Error::Spawn { .. })));
    assert!(received(&seen).is_empty());
}

#[tokio::test]
async fn second_start_is_rejected() {
    let command = BackgroundCommand::new(sh("exit 0"));
    command.start().unwrap();
    assert!(matches!(command.start(), Err(Error::AlreadyStarted)));
    command.wait().await.unwrap();
    assert!(matches!(command.start(), Err(Error::AlreadyStarted)));
}

#[tokio::test]
async fn wait_before_start_sees_completion() {
    let command = Arc::new(BackgroundCommand::new(sh("exit 3")));
    let waiter = {
        let command = Arc::clone(&command);
        tokio::spawn(async move { command.wait().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    command.start().unwrap();
    let output = waiter.await.unwrap().unwrap();
    assert_eq!(output.code, 3);
}

#[test]
fn blocking_wait_from_plain_thread() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let command = BackgroundCommand::new(sh("printf done"));
    {
        let _guard = runtime.enter();
        command.start().unwrap();
    }

    let output = command.blocking_wait().unwrap();
    assert_eq!(output.stdout, b"done");
}

#[tokio::test]
async fn scanner_command_runs_in_workdir() {
    let dir = tempdir().unwrap();
    let command =
        ScannerCommand::new("/bin/sh", ["-c", "echo minutiae > data.fpm"], None, None)
            .unwrap()
            .in_dir(dir.path());

    command.start().unwrap();
    let output = command.wait_checked().await.unwrap();

    assert!(output.success());
    assert_eq!(
        std::fs::read_to_string(command.data_file()).unwrap(),
        "minutiae\n"
    );
}
