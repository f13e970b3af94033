//! End-to-end runs against real child processes.
#![cfg(unix)]

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use anyhow::Result;
use assert_fs::TempDir;
use pretty_assertions::assert_eq;
use taskexec::{Deadline, ExecError, ExecTask, NeverCancel, SharedBuffer, TaskExecutor};
use tokio_util::sync::CancellationToken;

fn cancel_after(delay: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    token
}

#[tokio::test]
async fn counts_lines_from_stdin() -> Result<()> {
    let result = ExecTask::new("wc")
        .args(["-l"])
        .stdin(b"this\nhas\nfour\nlines\n".as_slice())
        .execute(&NeverCancel)
        .await?;

    assert_eq!(result.stdout.trim(), "4");
    assert!(result.success());
    Ok(())
}

#[tokio::test]
async fn transforms_stdin_with_split_command() -> Result<()> {
    let result = ExecTask::new("cat -b")
        .stdin(b"1 line 1".as_slice())
        .execute(&NeverCancel)
        .await?;

    assert_eq!(result.stdout, "     1\t1 line 1");
    Ok(())
}

#[tokio::test]
async fn unknown_command_fails_to_start() {
    let err = ExecTask::new("/bin/taskexec_you_cant_find_me /")
        .execute(&NeverCancel)
        .await
        .expect_err("missing executable");

    assert!(matches!(err, ExecError::Spawn { .. }));
    assert_eq!(err.io_kind(), Some(ErrorKind::NotFound));
    assert!(err.to_string().contains("No such file or directory"));

    let result = err.result();
    assert_eq!(result.exit_code, 0);
    assert!(!result.cancelled);
    assert!(result.stdout.is_empty());
    assert!(result.stderr.is_empty());
}

#[tokio::test]
async fn already_cancelled_does_not_run() {
    let token = CancellationToken::new();
    token.cancel();

    let err = ExecTask::new("/bin/ls /")
        .execute(&token)
        .await
        .expect_err("cancelled");

    assert!(err.is_cancelled());
    assert_eq!(err.exit_code(), -1);
    assert!(err.result().cancelled);
    assert!(err.result().stdout.is_empty());
}

#[tokio::test]
async fn cancel_during_execution_returns_promptly() {
    let token = cancel_after(Duration::from_millis(100));
    let started = Instant::now();

    let err = ExecTask::new("sleep 10")
        .execute(&token)
        .await
        .expect_err("cancelled");

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(err.is_cancelled());
    assert_eq!(err.result().exit_code, -1);
    assert!(err.result().cancelled);
}

#[tokio::test]
async fn cancel_during_shell_execution_returns_promptly() {
    let token = cancel_after(Duration::from_millis(100));
    let started = Instant::now();

    let err = ExecTask::new("sleep 10")
        .shell(true)
        .execute(&token)
        .await
        .expect_err("cancelled");

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(err.is_cancelled());
    assert_eq!(err.exit_code(), -1);
}

#[tokio::test]
async fn deadline_behaves_like_cancel() {
    let deadline = Deadline::after(Duration::from_millis(100));
    let started = Instant::now();

    let err = ExecTask::new("sleep")
        .args(["10"])
        .execute(&deadline)
        .await
        .expect_err("deadline expired");

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(err.is_cancelled());
    assert!(err.result().cancelled);
}

#[tokio::test]
async fn partial_output_survives_cancellation() {
    let token = cancel_after(Duration::from_millis(300));

    let err = ExecTask::new("echo started && exec sleep 10")
        .shell(true)
        .shell_path("/bin/sh")
        .execute(&token)
        .await
        .expect_err("cancelled");

    let result = err.into_result();
    assert!(result.cancelled);
    assert_eq!(result.exit_code, -1);
    assert_eq!(result.stdout, "started\n");
}

#[tokio::test]
async fn cancel_after_exit_keeps_success() -> Result<()> {
    let token = cancel_after(Duration::from_millis(300));
    let started = Instant::now();

    // The background sleep keeps stderr open after the shell exits.
    let result = ExecTask::new("echo done; sleep 3 >/dev/null &")
        .shell(true)
        .shell_path("/bin/sh")
        .execute(&token)
        .await?;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.stdout, "done\n");
    assert_eq!(result.exit_code, 0);
    assert!(result.cancelled);
    Ok(())
}

#[tokio::test]
async fn runs_through_shell() -> Result<()> {
    let result = ExecTask::new("/bin/ls /")
        .shell(true)
        .execute(&NeverCancel)
        .await?;

    assert!(!result.stdout.is_empty());
    assert!(result.stderr.is_empty());
    Ok(())
}

#[tokio::test]
async fn runs_through_shell_with_args() -> Result<()> {
    let result = ExecTask::new("/bin/ls")
        .args(["/"])
        .shell(true)
        .execute(&NeverCancel)
        .await?;

    assert!(!result.stdout.is_empty());
    assert!(result.stderr.is_empty());
    Ok(())
}

#[tokio::test]
async fn env_overrides_reach_child() -> Result<()> {
    let result = ExecTask::new("env")
        .env(["TASKEXEC_TEST=1", "TASKEXEC_TEST2=2"])
        .execute(&NeverCancel)
        .await?;

    assert!(result.stdout.lines().any(|line| line == "TASKEXEC_TEST=1"));
    assert!(result.stdout.lines().any(|line| line == "TASKEXEC_TEST2=2"));
    Ok(())
}

#[tokio::test]
async fn env_overrides_keep_inherited_variables() -> Result<()> {
    let executor = TaskExecutor::default().with_environment(vec![
        "INHERITED=value".to_string(),
        "SHADOWED=old".to_string(),
        "PATH=/usr/bin:/bin".to_string(),
    ]);

    let result = executor
        .execute(
            ExecTask::new("env").env(["SHADOWED=new"]),
            &NeverCancel,
        )
        .await?;

    let lines: Vec<&str> = result.stdout.lines().collect();
    assert!(lines.contains(&"INHERITED=value"));
    assert!(lines.contains(&"SHADOWED=new"));
    assert!(!lines.contains(&"SHADOWED=old"));
    Ok(())
}

#[tokio::test]
async fn env_overrides_apply_in_shell_mode() -> Result<()> {
    let result = ExecTask::new("env")
        .shell(true)
        .env(["TASKEXEC_TEST=1"])
        .execute(&NeverCancel)
        .await?;

    assert!(result.stdout.contains("TASKEXEC_TEST=1"));
    Ok(())
}

#[tokio::test]
async fn streams_stdout_while_capturing() -> Result<()> {
    let result = ExecTask::new("cat")
        .args(["-b"])
        .stdin(b"1 line 1".as_slice())
        .stream_stdio(true)
        .execute(&NeverCancel)
        .await?;

    assert_eq!(result.stdout, "     1\t1 line 1");
    Ok(())
}

#[tokio::test]
async fn failing_command_reports_exit_code_and_stderr() {
    let err = ExecTask::new("ls /unknown/location/should/fail")
        .stream_stdio(true)
        .execute(&NeverCancel)
        .await
        .expect_err("ls fails");

    let result = err.result();
    assert!(matches!(err, ExecError::Exited { .. }));
    assert_ne!(result.exit_code, 0);
    assert!(!result.cancelled);
    assert_eq!(result.stdout, "");
    assert!(result.stderr.contains("/unknown/location/should/fail"));
}

#[tokio::test]
async fn custom_sinks_replace_capture() -> Result<()> {
    let stdout = SharedBuffer::new();
    let stderr = SharedBuffer::new();

    let result = ExecTask::new("echo out; echo err >&2")
        .shell(true)
        .shell_path("/bin/sh")
        .stdout_sink(stdout.clone())
        .stderr_sink(stderr.clone())
        .execute(&NeverCancel)
        .await?;

    assert_eq!(result.stdout, "");
    assert_eq!(result.stderr, "");
    assert_eq!(stdout.contents(), "out\n");
    assert_eq!(stderr.contents(), "err\n");
    Ok(())
}

#[tokio::test]
async fn runs_in_working_directory() -> Result<()> {
    let dir = TempDir::new()?;
    let expected = dir.path().canonicalize()?;

    let result = ExecTask::new("pwd -P")
        .cwd(dir.path())
        .execute(&NeverCancel)
        .await?;

    assert_eq!(result.stdout.trim(), expected.to_string_lossy());
    Ok(())
}

#[tokio::test]
async fn executable_path_with_space_needs_args() -> Result<()> {
    let dir = TempDir::new()?;
    let spaced = dir.path().join("exec test");
    std::fs::create_dir(&spaced)?;
    let echo = spaced.join("echo");
    std::fs::copy("/bin/echo", &echo)?;

    let result = ExecTask::new(echo.to_string_lossy())
        .args(["hello world"])
        .execute(&NeverCancel)
        .await?;

    assert_eq!(result.stdout, "hello world\n");
    Ok(())
}

#[tokio::test]
async fn concurrent_tasks_do_not_share_output() -> Result<()> {
    let executor = TaskExecutor::default();
    let runs = (0..4).map(|index| {
        executor.execute(
            ExecTask::new("echo").args([format!("task-{index}")]),
            &NeverCancel,
        )
    });

    let results = futures::future::join_all(runs).await;
    for (index, result) in results.into_iter().enumerate() {
        assert_eq!(result?.stdout, format!("task-{index}\n"));
    }
    Ok(())
}
