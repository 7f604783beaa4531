//! External process execution.
//!
//! Every command the tool starts (WP-CLI, ssh, scp, shell helpers) goes
//! through a [`CommandRunner`], so the orchestration can be exercised in
//! tests without touching a network or a real WordPress install.

use std::process::Command;

use tracing::debug;

use crate::sync::{SyncError, SyncResult};

/// A program and its arguments, passed without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    #[must_use]
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// One-line rendering for logs and error messages.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Short description of a failure: stderr, else stdout, else the status.
    #[must_use]
    pub fn summary(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("status {}", self.status_label())
    }

    /// Exit status as text (`1`, `signal`).
    #[must_use]
    pub fn status_label(&self) -> String {
        self.status
            .map_or_else(|| "signal".to_string(), |code| code.to_string())
    }

    /// Turn a non-zero exit into [`SyncError::CommandFailed`].
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` when the process did not exit with 0.
    pub fn check(self, invocation: &Invocation) -> SyncResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(SyncError::CommandFailed {
                command: invocation.display(),
                status: self.status_label(),
                message: self.summary(),
            })
        }
    }
}

/// Runs external commands to completion.
pub trait CommandRunner {
    /// Run `invocation` and capture its output.
    ///
    /// A non-zero exit is not an error at this level; callers decide.
    ///
    /// # Errors
    ///
    /// Returns `Spawn` if the program cannot be started.
    fn run(&self, invocation: &Invocation) -> SyncResult<CommandOutput>;
}

/// Runs commands as child processes of this one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> SyncResult<CommandOutput> {
        debug!(program = %invocation.program, args = ?invocation.args, "Running command");

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .map_err(|source| SyncError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(program = %invocation.program, status = %result.status_label(), "Command finished");
        Ok(result)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prefers_stderr() {
        let out = CommandOutput {
            status: Some(1),
            stdout: "partial\n".into(),
            stderr: "Error: disk full\n".into(),
        };
        assert_eq!(out.summary(), "Error: disk full");

        let silent = CommandOutput {
            status: None,
            ..CommandOutput::default()
        };
        assert_eq!(silent.summary(), "status signal");
    }

    #[test]
    fn test_check_maps_non_zero_exit() {
        let inv = Invocation::new("wp", ["db", "export", "/tmp/x.sql"]);
        let out = CommandOutput {
            status: Some(1),
            stdout: String::new(),
            stderr: "Error establishing a database connection".into(),
        };
        match out.check(&inv) {
            Err(SyncError::CommandFailed {
                command,
                status,
                message,
            }) => {
                assert_eq!(command, "wp db export /tmp/x.sql");
                assert_eq!(status, "1");
                assert!(message.contains("database connection"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_system_runner_spawn_error() {
        let inv = Invocation::new("wpsync-test-no-such-program", Vec::<String>::new());
        let err = SystemRunner.run(&inv).unwrap_err();
        assert!(matches!(err, SyncError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_output() {
        let inv = Invocation::new("sh", ["-c", "echo out; echo err >&2; exit 3"]);
        let out = SystemRunner.run(&inv).unwrap();
        assert_eq!(out.status, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }
}
