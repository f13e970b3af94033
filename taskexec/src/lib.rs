//! Launch and supervise a single external process.
//!
//! An [`ExecTask`] describes the invocation: a command line or an executable
//! with explicit arguments, optionally routed through a shell, with
//! environment overrides, an input stream and output sinks. The
//! [`TaskExecutor`] resolves it into a concrete argv and environment, spawns
//! the child, captures or mirrors its output and races completion against a
//! caller-owned [`CancelSignal`].
//!
//! ```no_run
//! use taskexec::ExecTask;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), taskexec::ExecError> {
//! let token = CancellationToken::new();
//! let result = ExecTask::new("wc")
//!     .args(["-l"])
//!     .stdin(b"a\nb\n".as_slice())
//!     .execute(&token)
//!     .await?;
//! assert_eq!(result.stdout.trim(), "2");
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod output;
pub mod spawn;
pub mod task;

pub use cancel::{CancelSignal, Deadline, NeverCancel};
pub use command::{
    DEFAULT_SHELL, EnvironmentSource, InheritedEnvironment, ResolvedCommand, resolve_command,
    resolve_env,
};
pub use config::TaskConfig;
pub use error::ExecError;
pub use executor::{MirrorTarget, ProcessStdio, TaskExecutor};
pub use output::{FanOutWriter, SharedBuffer};
pub use spawn::{
    ChildTerminator, ExitState, ProcessSpawner, SpawnRequest, SpawnedChild, StdinMode,
    TokioSpawner,
};
pub use task::{BoxedReader, BoxedWriter, ExecResult, ExecTask};
