use std::fmt;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::cancel::CancelSignal;
use crate::command::resolve_command;
use crate::error::ExecError;
use crate::executor::TaskExecutor;

/// Readable stream fed to a child's standard input.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable stream receiving a child's standard output or error.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Describes a single command invocation.
///
/// `command` is either a bare executable path or, when `args` is empty, an
/// executable followed by space-separated arguments:
///
/// - just a binary: `/bin/ls`
/// - binary with arguments: `/bin/ls -la /`
///
/// Streams are single-use, so a task is consumed when it is executed.
#[derive(Default)]
pub struct ExecTask {
    /// Executable path, or command line when `args` is empty.
    pub command: String,
    /// Arguments passed verbatim. When non-empty `command` is never split.
    pub args: Vec<String>,
    /// Run the command as a script through a shell interpreter.
    pub shell: bool,
    /// Shell executable used when `shell` is set. Defaults to `/bin/bash`.
    pub shell_path: Option<String>,
    /// `KEY=VALUE` entries layered over the inherited environment.
    pub env: Vec<String>,
    /// Working directory of the child. Inherited when unset.
    pub cwd: Option<PathBuf>,
    /// Stream connected to the child's stdin. Null device when unset.
    pub stdin: Option<BoxedReader>,
    /// Mirror stdout/stderr to the current process while still capturing.
    pub stream_stdio: bool,
    /// Replaces capture and mirroring of stdout; `ExecResult::stdout` stays empty.
    pub stdout: Option<BoxedWriter>,
    /// Replaces capture and mirroring of stderr; `ExecResult::stderr` stays empty.
    pub stderr: Option<BoxedWriter>,
    /// Print `exec: <command line>` before spawning.
    pub print_command: bool,
}

impl ExecTask {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn shell_path(mut self, path: impl Into<String>) -> Self {
        self.shell_path = Some(path.into());
        self
    }

    pub fn env(mut self, env: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.env = env.into_iter().map(Into::into).collect();
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn stdin(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(reader));
        self
    }

    pub fn stream_stdio(mut self, stream: bool) -> Self {
        self.stream_stdio = stream;
        self
    }

    pub fn stdout_sink(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(writer));
        self
    }

    pub fn stderr_sink(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(writer));
        self
    }

    pub fn print_command(mut self, print: bool) -> Self {
        self.print_command = print;
        self
    }

    /// Run the task with the default [`TaskExecutor`].
    pub async fn execute(self, cancel: &dyn CancelSignal) -> Result<ExecResult, ExecError> {
        TaskExecutor::default().execute(self, cancel).await
    }
}

/// Renders the resolved command line, e.g. `/bin/bash -c ls -la`.
impl fmt::Display for ExecTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = resolve_command(self);
        let line = format!("{} {}", resolved.program, resolved.args.join(" "));
        f.write_str(line.trim())
    }
}

impl fmt::Debug for ExecTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecTask")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("shell", &self.shell)
            .field("shell_path", &self.shell_path)
            .field("env", &self.env)
            .field("cwd", &self.cwd)
            .field("stdin", &self.stdin.is_some())
            .field("stream_stdio", &self.stream_stdio)
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("print_command", &self.print_command)
            .finish()
    }
}

/// Outcome record of one invocation.
///
/// `exit_code` is `-1` when the invocation was cancelled; `cancelled` is the
/// authoritative way to tell cancellation apart from a child that exited
/// with `-1` itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub cancelled: bool,
}

impl ExecResult {
    pub(crate) fn cancelled() -> Self {
        Self {
            exit_code: -1,
            cancelled: true,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.cancelled
    }
}
