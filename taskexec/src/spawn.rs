//! Process spawn primitive consumed by the executor.
//!
//! [`ProcessSpawner`] is the seam between the supervisor and the platform:
//! given a resolved request it starts a child and hands back its pipes, a
//! future resolving to the exit state and a [`ChildTerminator`].
//! [`TokioSpawner`] is the production implementation.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use futures::future::{BoxFuture, FutureExt};
use tokio::process::Command;

use crate::task::{BoxedReader, BoxedWriter};

/// How the child's stdin is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    /// Stdin is a pipe fed by the executor.
    Piped,
    /// Stdin is the null device (immediate EOF).
    Null,
}

/// Fully resolved description of the process to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Complete child environment as `KEY=VALUE` entries.
    pub env: Vec<String>,
    pub stdin: StdinMode,
}

/// Exit status of a finished child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitState {
    success: bool,
    code: Option<i32>,
}

impl ExitState {
    pub fn new(success: bool, code: Option<i32>) -> Self {
        Self { success, code }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Raw exit code; `None` when the child was terminated by a signal.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Exit code reported in results, `-1` for signal terminations.
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

impl From<std::process::ExitStatus> for ExitState {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// Trait for process termination strategies.
pub trait ChildTerminator: Send + Sync {
    /// Forcibly kill the child. Killing an already-exited child is not an error.
    fn kill(&mut self) -> io::Result<()>;
}

/// A started child process.
pub struct SpawnedChild {
    pub pid: Option<u32>,
    /// Write end of the child's stdin when spawned with [`StdinMode::Piped`].
    pub stdin: Option<BoxedWriter>,
    pub stdout: Option<BoxedReader>,
    pub stderr: Option<BoxedReader>,
    /// Resolves once the child has exited and been reaped.
    pub exit: BoxFuture<'static, io::Result<ExitState>>,
    pub terminator: Box<dyn ChildTerminator>,
}

impl fmt::Debug for SpawnedChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedChild")
            .field("pid", &self.pid)
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// Starts child processes.
pub trait ProcessSpawner: Send + Sync {
    /// Start the child. Errors are surfaced to the caller unmodified.
    fn spawn(&self, request: &SpawnRequest) -> io::Result<SpawnedChild>;
}

/// Spawns children with [`tokio::process::Command`].
///
/// Must be called from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl ProcessSpawner for TokioSpawner {
    fn spawn(&self, request: &SpawnRequest) -> io::Result<SpawnedChild> {
        let mut command = Command::new(&request.program);
        command.args(&request.args);

        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }

        command.env_clear();
        for entry in &request.env {
            match entry.split_once('=') {
                Some((key, value)) => {
                    command.env(key, value);
                }
                None => tracing::debug!(entry = %entry, "skipping environment entry without '='"),
            }
        }

        match request.stdin {
            StdinMode::Piped => command.stdin(Stdio::piped()),
            StdinMode::Null => command.stdin(Stdio::null()),
        };
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        let mut child = command.spawn()?;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .map(|stdin| Box::new(stdin) as BoxedWriter);
        let stdout = child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as BoxedReader);
        let stderr = child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as BoxedReader);

        let exit = async move { child.wait().await.map(ExitState::from) }.boxed();

        Ok(SpawnedChild {
            pid,
            stdin,
            stdout,
            stderr,
            exit,
            terminator: Box::new(PidTerminator { pid }),
        })
    }
}

/// Kills a single child by PID.
struct PidTerminator {
    pid: Option<u32>,
}

impl ChildTerminator for PidTerminator {
    fn kill(&mut self) -> io::Result<()> {
        match self.pid {
            Some(pid) => kill_process(pid),
            None => Ok(()),
        }
    }
}

/// Send `SIGKILL` to `pid`. A process that no longer exists is not an error.
#[cfg(unix)]
pub fn kill_process(pid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    match signal::kill(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Kill a process by PID on Windows.
#[cfg(windows)]
pub fn kill_process(pid: u32) -> io::Result<()> {
    unsafe {
        let handle = winapi::um::processthreadsapi::OpenProcess(
            winapi::um::winnt::PROCESS_TERMINATE,
            0,
            pid,
        );
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        let success = winapi::um::processthreadsapi::TerminateProcess(handle, 1);
        let err = io::Error::last_os_error();
        winapi::um::handleapi::CloseHandle(handle);
        if success == 0 { Err(err) } else { Ok(()) }
    }
}

/// No-op on platforms without a kill primitive.
#[cfg(not(any(unix, windows)))]
pub fn kill_process(_pid: u32) -> io::Result<()> {
    Ok(())
}
