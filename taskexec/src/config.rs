//! Declarative task description for callers that load invocations from
//! configuration files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::Deadline;
use crate::task::ExecTask;

/// Serializable subset of [`ExecTask`]. Streams cannot be configured
/// declaratively and are attached to the task after conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub command: String,
    pub args: Vec<String>,
    pub shell: bool,
    pub shell_path: Option<String>,
    pub env: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub stream_stdio: bool,
    pub print_command: bool,
    /// Cancel the invocation after this many milliseconds.
    pub timeout_ms: Option<u64>,
}

impl TaskConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Deadline starting now, when a timeout is configured.
    pub fn deadline(&self) -> Option<Deadline> {
        self.timeout().map(Deadline::after)
    }

    pub fn into_task(self) -> ExecTask {
        ExecTask {
            command: self.command,
            args: self.args,
            shell: self.shell,
            shell_path: self.shell_path,
            env: self.env,
            cwd: self.cwd,
            stream_stdio: self.stream_stdio,
            print_command: self.print_command,
            ..ExecTask::default()
        }
    }
}

impl From<TaskConfig> for ExecTask {
    fn from(config: TaskConfig) -> Self {
        config.into_task()
    }
}
