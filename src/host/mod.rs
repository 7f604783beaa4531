//! Hosts: where an environment's files and processes live.
//!
//! A [`Host`] is either the local machine or a remote shell reached over
//! ssh. File operations on the local machine use `std::fs` directly; on a
//! remote host they become small POSIX shell commands.

pub mod runner;
pub mod ssh;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::model::Access;
use crate::sync::hash::{file_checksum, parse_checksum_output};
use crate::sync::{SyncError, SyncResult};

pub use runner::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use ssh::{sh_quote, shell_line, SshTarget, DEFAULT_CONNECT_TIMEOUT};

/// ssh reserves exit status 255 for its own failures (connection refused,
/// authentication, DNS).
pub const SSH_FAILURE_STATUS: i32 = 255;

/// Where commands run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local,
    Remote(SshTarget),
}

/// An execution context bound to a command runner.
pub struct Host<'a> {
    location: Location,
    runner: &'a dyn CommandRunner,
}

impl<'a> Host<'a> {
    #[must_use]
    pub fn new(location: Location, runner: &'a dyn CommandRunner) -> Self {
        Self { location, runner }
    }

    /// Host for an environment's access block.
    #[must_use]
    pub fn from_access(access: &Access, connect_timeout: u64, runner: &'a dyn CommandRunner) -> Self {
        let location = SshTarget::from_access(access, connect_timeout)
            .map_or(Location::Local, Location::Remote);
        Self::new(location, runner)
    }

    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    #[must_use]
    pub fn ssh_target(&self) -> Option<&SshTarget> {
        match &self.location {
            Location::Local => None,
            Location::Remote(target) => Some(target),
        }
    }

    #[must_use]
    pub fn runner(&self) -> &'a dyn CommandRunner {
        self.runner
    }

    /// `local` or `user@host`.
    #[must_use]
    pub fn label(&self) -> String {
        self.ssh_target()
            .map_or_else(|| "local".to_string(), SshTarget::destination)
    }

    /// Run a program with arguments on this host.
    ///
    /// Remote programs are started through ssh with every word quoted. An
    /// ssh failure (status 255) becomes [`SyncError::Unreachable`]; any
    /// other status is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns `Spawn` or `Unreachable`.
    pub fn exec<S: AsRef<str>>(&self, program: &str, args: &[S]) -> SyncResult<CommandOutput> {
        match &self.location {
            Location::Local => {
                let invocation =
                    Invocation::new(program, args.iter().map(|a| a.as_ref().to_string()));
                self.runner.run(&invocation)
            }
            Location::Remote(_) => self.exec_line(&shell_line(program, args)),
        }
    }

    /// Like [`Host::exec`], failing on any non-zero status.
    ///
    /// # Errors
    ///
    /// Returns `Spawn`, `Unreachable` or `CommandFailed`.
    pub fn exec_checked<S: AsRef<str>>(&self, program: &str, args: &[S]) -> SyncResult<CommandOutput> {
        let output = self.exec(program, args)?;
        if output.success() {
            return Ok(output);
        }
        Err(SyncError::CommandFailed {
            command: shell_line(program, args),
            status: output.status_label(),
            message: output.summary(),
        })
    }

    /// Run a shell command line (`sh -c` locally, the login shell remotely).
    ///
    /// # Errors
    ///
    /// Returns `Spawn` or `Unreachable`.
    pub fn exec_line(&self, line: &str) -> SyncResult<CommandOutput> {
        match &self.location {
            Location::Local => self.runner.run(&Invocation::new("sh", ["-c", line])),
            Location::Remote(target) => {
                let output = self.runner.run(&Invocation::new("ssh", target.ssh_args(line)))?;
                if output.status == Some(SSH_FAILURE_STATUS) {
                    return Err(SyncError::Unreachable {
                        target: target.destination(),
                        message: output.summary(),
                    });
                }
                Ok(output)
            }
        }
    }

    /// Check that the host answers. Always succeeds locally.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` when ssh cannot log in.
    pub fn probe(&self) -> SyncResult<()> {
        let Location::Remote(target) = &self.location else {
            return Ok(());
        };
        let output = self.exec_line("true")?;
        if output.success() {
            debug!(host = %target.destination(), "Host reachable");
            Ok(())
        } else {
            Err(SyncError::Unreachable {
                target: target.destination(),
                message: output.summary(),
            })
        }
    }

    /// Remove a file; a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and cannot be removed.
    pub fn remove_file(&self, path: &str) -> SyncResult<()> {
        match &self.location {
            Location::Local => match fs::remove_file(path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            },
            Location::Remote(_) => self.exec_checked("rm", &["-f", path]).map(|_| ()),
        }
    }

    /// Whether a regular file exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote check itself fails.
    pub fn file_exists(&self, path: &str) -> SyncResult<bool> {
        match &self.location {
            Location::Local => Ok(Path::new(path).is_file()),
            Location::Remote(_) => {
                let output = self.exec("test", &["-f", path])?;
                match output.status {
                    Some(0) => Ok(true),
                    Some(1) => Ok(false),
                    _ => Err(SyncError::CommandFailed {
                        command: shell_line("test", &["-f", path]),
                        status: output.status_label(),
                        message: output.summary(),
                    }),
                }
            }
        }
    }

    /// SHA-256 of a file as lowercase hex.
    ///
    /// Remote hosts use `sha256sum`, falling back to `shasum -a 256`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or no digest is printed.
    pub fn checksum(&self, path: &str) -> SyncResult<String> {
        match &self.location {
            Location::Local => {
                if !Path::new(path).is_file() {
                    return Err(SyncError::FileNotFound(path.to_string()));
                }
                Ok(file_checksum(Path::new(path))?)
            }
            Location::Remote(_) => {
                let quoted = sh_quote(path);
                let line = format!("sha256sum {quoted} 2>/dev/null || shasum -a 256 {quoted}");
                let output = self.exec_line(&line)?;
                if !output.success() {
                    return Err(SyncError::CommandFailed {
                        command: line,
                        status: output.status_label(),
                        message: output.summary(),
                    });
                }
                parse_checksum_output(&output.stdout).ok_or_else(|| {
                    SyncError::Verification(format!(
                        "no checksum printed for {path} on {}",
                        self.label()
                    ))
                })
            }
        }
    }

    /// Create a directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_dir(&self, dir: &str) -> SyncResult<()> {
        match &self.location {
            Location::Local => Ok(fs::create_dir_all(dir)?),
            Location::Remote(_) => self.exec_checked("mkdir", &["-p", dir]).map(|_| ()),
        }
    }

    /// File names inside `dir`, sorted. A missing directory is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list_dir(&self, dir: &str) -> SyncResult<Vec<String>> {
        let mut names = match &self.location {
            Location::Local => match fs::read_dir(dir) {
                Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
                Ok(entries) => {
                    let mut names = Vec::new();
                    for entry in entries {
                        let entry = entry?;
                        if entry.file_type()?.is_file() {
                            names.push(entry.file_name().to_string_lossy().into_owned());
                        }
                    }
                    names
                }
            },
            Location::Remote(_) => {
                let line = format!("ls -1 {} 2>/dev/null || true", sh_quote(dir));
                let output = self.exec_line(&line)?;
                output
                    .stdout
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            }
        };
        names.sort();
        Ok(names)
    }

    /// Size of a file in bytes, if it can be determined.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote command cannot be run.
    pub fn file_size(&self, path: &str) -> SyncResult<Option<u64>> {
        match &self.location {
            Location::Local => Ok(fs::metadata(path).ok().map(|m| m.len())),
            Location::Remote(_) => {
                let output = self.exec_line(&format!("wc -c < {}", sh_quote(path)))?;
                Ok(output
                    .success()
                    .then(|| output.stdout.trim().parse().ok())
                    .flatten())
            }
        }
    }
}
