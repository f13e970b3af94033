use std::io;

use thiserror::Error;

use crate::task::ExecResult;

/// Failure outcome of [`TaskExecutor::execute`](crate::TaskExecutor::execute).
///
/// Every variant except [`ExecError::Spawn`] carries the result assembled for
/// the invocation, including any output captured before the failure.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The child never started: missing executable, permission denied,
    /// malformed environment.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The child ran and exited unsuccessfully.
    #[error("`{command}` exited with status {}", .result.exit_code)]
    Exited { command: String, result: ExecResult },

    /// The cancellation signal fired before or while the child ran.
    #[error("`{command}` was cancelled")]
    Cancelled { command: String, result: ExecResult },

    /// Waiting for the child's exit status failed.
    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
        result: ExecResult,
    },
}

impl ExecError {
    /// Result associated with the failure; the zero value for spawn failures.
    pub fn result(&self) -> ExecResult {
        match self {
            Self::Spawn { .. } => ExecResult::default(),
            Self::Exited { result, .. }
            | Self::Cancelled { result, .. }
            | Self::Wait { result, .. } => result.clone(),
        }
    }

    pub fn into_result(self) -> ExecResult {
        match self {
            Self::Spawn { .. } => ExecResult::default(),
            Self::Exited { result, .. }
            | Self::Cancelled { result, .. }
            | Self::Wait { result, .. } => result,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Spawn { .. } => 0,
            Self::Exited { result, .. }
            | Self::Cancelled { result, .. }
            | Self::Wait { result, .. } => result.exit_code,
        }
    }

    /// Kind of the underlying I/O error, if any.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Spawn { source, .. } | Self::Wait { source, .. } => Some(source.kind()),
            Self::Exited { .. } | Self::Cancelled { .. } => None,
        }
    }
}
