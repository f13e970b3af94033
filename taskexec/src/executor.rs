//! Execution supervisor: spawns the child, wires its streams and races
//! completion against cancellation.

use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::task::{AbortHandle, JoinHandle};

use crate::cancel::CancelSignal;
use crate::command::{EnvironmentSource, InheritedEnvironment, resolve_command, resolve_env};
use crate::error::ExecError;
use crate::output::{FanOutWriter, SharedBuffer, pump};
use crate::spawn::{
    ExitState, ProcessSpawner, SpawnRequest, SpawnedChild, StdinMode, TokioSpawner,
};
use crate::task::{BoxedReader, BoxedWriter, ExecResult, ExecTask};

/// How long output pumps may keep flushing after a cancelled child is killed.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(100);

/// Destinations used when a task streams its output live.
pub trait MirrorTarget: Send + Sync {
    fn stdout(&self) -> BoxedWriter;
    fn stderr(&self) -> BoxedWriter;
}

/// Mirrors to the current process's stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessStdio;

impl MirrorTarget for ProcessStdio {
    fn stdout(&self) -> BoxedWriter {
        Box::new(tokio::io::stdout())
    }

    fn stderr(&self) -> BoxedWriter {
        Box::new(tokio::io::stderr())
    }
}

/// Runs [`ExecTask`]s.
///
/// The executor holds no per-invocation state, so one instance can drive any
/// number of concurrent tasks.
pub struct TaskExecutor<S = TokioSpawner> {
    spawner: S,
    environment: Arc<dyn EnvironmentSource>,
    mirror: Arc<dyn MirrorTarget>,
    kill_grace: Duration,
}

impl Default for TaskExecutor<TokioSpawner> {
    fn default() -> Self {
        Self::new(TokioSpawner)
    }
}

impl<S: ProcessSpawner> TaskExecutor<S> {
    pub fn new(spawner: S) -> Self {
        Self {
            spawner,
            environment: Arc::new(InheritedEnvironment),
            mirror: Arc::new(ProcessStdio),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Replace the inherited environment snapshot.
    pub fn with_environment(mut self, environment: impl EnvironmentSource + 'static) -> Self {
        self.environment = Arc::new(environment);
        self
    }

    /// Replace the destinations used by `stream_stdio` and `print_command`.
    pub fn with_mirror(mut self, mirror: impl MirrorTarget + 'static) -> Self {
        self.mirror = Arc::new(mirror);
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Run `task` to completion or until `cancel` fires.
    ///
    /// Returns the result on a zero exit. Every failure carries its result
    /// through [`ExecError::result`]:
    /// - `Spawn`: the child never started, zero-value result.
    /// - `Exited`: non-zero exit, captured output and the real exit code.
    /// - `Cancelled`: exit code `-1`, output captured up to termination.
    ///
    /// A signal that fires after the child has exited only sets `cancelled`;
    /// the exit status still decides the outcome.
    pub async fn execute(
        &self,
        task: ExecTask,
        cancel: &dyn CancelSignal,
    ) -> Result<ExecResult, ExecError> {
        let command_line = task.to_string();

        if cancel.is_fired() {
            tracing::debug!(command = %command_line, "cancelled before start");
            return Err(ExecError::Cancelled {
                command: command_line,
                result: ExecResult::cancelled(),
            });
        }

        let resolved = resolve_command(&task);
        let env = resolve_env(&task.env, self.environment.as_ref());

        if task.print_command {
            self.echo(&command_line).await;
        }

        let ExecTask {
            cwd,
            stdin,
            stream_stdio,
            stdout: stdout_sink,
            stderr: stderr_sink,
            ..
        } = task;

        let request = SpawnRequest {
            program: resolved.program,
            args: resolved.args,
            cwd,
            env,
            stdin: if stdin.is_some() {
                StdinMode::Piped
            } else {
                StdinMode::Null
            },
        };

        let child = self
            .spawner
            .spawn(&request)
            .map_err(|source| ExecError::Spawn {
                program: request.program.clone(),
                source,
            })?;

        let SpawnedChild {
            pid,
            stdin: child_stdin,
            stdout: child_stdout,
            stderr: child_stderr,
            exit,
            mut terminator,
        } = child;
        tracing::debug!(command = %command_line, pid, "process started");

        let stdout_capture = SharedBuffer::new();
        let stderr_capture = SharedBuffer::new();
        let stdout_fanout = output_fanout(
            "stdout",
            stdout_sink,
            &stdout_capture,
            stream_stdio.then(|| self.mirror.stdout()),
        );
        let stderr_fanout = output_fanout(
            "stderr",
            stderr_sink,
            &stderr_capture,
            stream_stdio.then(|| self.mirror.stderr()),
        );

        let stdout_task = child_stdout.map(|reader| tokio::spawn(pump(reader, stdout_fanout)));
        let stderr_task = child_stderr.map(|reader| tokio::spawn(pump(reader, stderr_fanout)));
        let stdin_task = match (stdin, child_stdin) {
            (Some(reader), Some(writer)) => Some(tokio::spawn(feed_stdin(reader, writer))),
            _ => None,
        };

        let abort_handles: Vec<AbortHandle> = [&stdout_task, &stderr_task, &stdin_task]
            .into_iter()
            .flatten()
            .map(JoinHandle::abort_handle)
            .collect();

        // Filled as soon as the child exits, even while its pipes stay open.
        let exit_status: Mutex<Option<io::Result<ExitState>>> = Mutex::new(None);
        let completion = async {
            let status = exit.await;
            *exit_status.lock() = Some(status);
            for handle in [stdout_task, stderr_task].into_iter().flatten() {
                if let Err(err) = handle.await {
                    tracing::debug!(error = %err, "output pump did not finish");
                }
            }
        };
        tokio::pin!(completion);

        let cancelled_first = tokio::select! {
            biased;
            () = &mut completion => false,
            () = cancel.fired() => true,
        };

        let mut killed = false;
        if cancelled_first {
            if exit_status.lock().is_some() {
                tracing::debug!(command = %command_line, pid, "cancelled while draining output");
            } else {
                killed = true;
                match terminator.kill() {
                    Ok(()) => {
                        tracing::debug!(command = %command_line, pid, "killed cancelled process");
                    }
                    Err(err) => {
                        tracing::warn!(
                            command = %command_line,
                            pid,
                            error = %err,
                            "failed to kill cancelled process"
                        );
                    }
                }
            }

            // Let the pumps flush what the child wrote before it died.
            if tokio::time::timeout(self.kill_grace, &mut completion)
                .await
                .is_err()
            {
                tracing::debug!(command = %command_line, pid, "output still open after cancel");
            }
        }
        abort_all(&abort_handles);

        let result = ExecResult {
            stdout: stdout_capture.contents(),
            stderr: stderr_capture.contents(),
            exit_code: 0,
            cancelled: cancel.is_fired(),
        };
        let status = exit_status.lock().take();
        match status {
            Some(status) if !killed => settle(command_line, pid, status, result),
            _ => Err(ExecError::Cancelled {
                command: command_line,
                result: ExecResult {
                    exit_code: -1,
                    cancelled: true,
                    ..result
                },
            }),
        }
    }

    async fn echo(&self, command_line: &str) {
        let mut out = self.mirror.stdout();
        let line = format!("exec: {command_line}\n");
        let written = match out.write_all(line.as_bytes()).await {
            Ok(()) => out.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            tracing::warn!(error = %err, "failed to print command");
        }
    }
}

/// Outcome of a child that exited on its own. A signal that fired after the
/// exit is reflected in `result.cancelled` but never overrides the exit code.
fn settle(
    command: String,
    pid: Option<u32>,
    status: io::Result<ExitState>,
    mut result: ExecResult,
) -> Result<ExecResult, ExecError> {
    match status {
        Ok(state) if state.success() => {
            tracing::debug!(command = %command, pid, "process exited successfully");
            Ok(result)
        }
        Ok(state) => {
            result.exit_code = state.exit_code();
            tracing::debug!(
                command = %command,
                pid,
                code = result.exit_code,
                "process exited unsuccessfully"
            );
            Err(ExecError::Exited { command, result })
        }
        Err(source) => Err(ExecError::Wait {
            command,
            source,
            result,
        }),
    }
}

/// Destinations for one output stream: a caller sink replaces both the
/// capture buffer and the mirror.
fn output_fanout(
    label: &'static str,
    sink: Option<BoxedWriter>,
    capture: &SharedBuffer,
    mirror: Option<BoxedWriter>,
) -> FanOutWriter {
    if let Some(sink) = sink {
        return FanOutWriter::new(label).push_boxed(sink);
    }

    let fanout = FanOutWriter::new(label).push(capture.clone());
    match mirror {
        Some(mirror) => fanout.push_boxed(mirror),
        None => fanout,
    }
}

/// Copy the caller's input into the child's stdin, then close it.
async fn feed_stdin(mut reader: BoxedReader, mut writer: BoxedWriter) {
    if let Err(err) = tokio::io::copy(&mut reader, &mut writer).await
        && err.kind() != ErrorKind::BrokenPipe
    {
        tracing::debug!(error = %err, "failed to write child stdin");
    }
    if let Err(err) = writer.shutdown().await
        && err.kind() != ErrorKind::BrokenPipe
    {
        tracing::debug!(error = %err, "failed to close child stdin");
    }
}

fn abort_all(handles: &[AbortHandle]) {
    for handle in handles {
        handle.abort();
    }
}
