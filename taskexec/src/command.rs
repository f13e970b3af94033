//! Translation of a task's declarative fields into an executable, an argument
//! vector and an environment list.
//!
//! Everything here is pure: resolving the same task twice yields the same
//! result, and the inherited environment is read through
//! [`EnvironmentSource`] so the merge rules can be exercised with a fake
//! snapshot.

use hashbrown::HashSet;

use crate::task::ExecTask;

/// Shell used when a task sets `shell` without a `shell_path`.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Executable and argument vector handed to the spawn primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Resolve the executable and argv for `task`.
///
/// - shell mode: `<shell> -c <script>`, where the script is `command` with
///   runs of spaces collapsed, or `command` followed by the space-joined
///   `args`. Arguments are appended as script text without quoting.
/// - direct mode with `args`: `command` verbatim, `args` verbatim.
/// - direct mode without `args`: `command` split on every `' '`; the first
///   token is the executable. Paths containing spaces need `args`.
pub fn resolve_command(task: &ExecTask) -> ResolvedCommand {
    if task.shell {
        let program = task
            .shell_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .unwrap_or(DEFAULT_SHELL)
            .to_string();

        let script = if task.args.is_empty() {
            task.command
                .split(' ')
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            format!("{} {}", task.command, task.args.join(" "))
        };

        return ResolvedCommand {
            program,
            args: vec!["-c".to_string(), script],
        };
    }

    if !task.args.is_empty() {
        return ResolvedCommand {
            program: task.command.clone(),
            args: task.args.clone(),
        };
    }

    let mut parts = task.command.split(' ');
    let program = parts.next().unwrap_or_default().to_string();
    ResolvedCommand {
        program,
        args: parts.map(str::to_string).collect(),
    }
}

/// Read-only snapshot of the variables a child would otherwise inherit.
pub trait EnvironmentSource: Send + Sync {
    /// `KEY=VALUE` entries in inherited order.
    fn snapshot(&self) -> Vec<String>;
}

/// The current process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct InheritedEnvironment;

impl EnvironmentSource for InheritedEnvironment {
    fn snapshot(&self) -> Vec<String> {
        std::env::vars_os()
            .map(|(key, value)| format!("{}={}", key.to_string_lossy(), value.to_string_lossy()))
            .collect()
    }
}

impl EnvironmentSource for Vec<String> {
    fn snapshot(&self) -> Vec<String> {
        self.clone()
    }
}

/// Key of a `KEY=VALUE` entry: everything before the first `=`.
pub fn env_key(entry: &str) -> &str {
    entry.split_once('=').map_or(entry, |(key, _)| key)
}

/// Build the child environment.
///
/// With no overrides the inherited snapshot is returned unchanged. Otherwise
/// every override is emitted in order, followed by the inherited entries whose
/// key no override mentions. Duplicate override keys are passed through as is.
pub fn resolve_env(overrides: &[String], inherited: &dyn EnvironmentSource) -> Vec<String> {
    let snapshot = inherited.snapshot();
    if overrides.is_empty() {
        return snapshot;
    }

    let keys: HashSet<&str> = overrides.iter().map(|entry| env_key(entry)).collect();
    let mut env = overrides.to_vec();
    env.extend(
        snapshot
            .into_iter()
            .filter(|entry| !keys.contains(env_key(entry))),
    );
    env
}
