//! Snapshot transport between hosts.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::host::{CommandRunner, Invocation, Location};
use crate::site::Site;
use crate::sync::types::{SyncError, SyncResult};

/// Copies a snapshot file from one site's host to another's.
pub trait Transport {
    /// Copy `from_path` on `from`'s host to `to_path` on `to`'s host.
    ///
    /// The destination directory is created first. The copy is
    /// byte-for-byte; integrity is checked by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails or a host is unreachable.
    fn copy(&self, from: &dyn Site, from_path: &str, to: &dyn Site, to_path: &str) -> SyncResult<()>;
}

/// `fs::copy` locally, `scp` otherwise.
pub struct ScpTransport<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ScpTransport<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Build the scp invocation for a copy with at least one remote side.
    fn scp_invocation(from: &Location, from_path: &str, to: &Location, to_path: &str) -> Option<Invocation> {
        let args = match (from, to) {
            (Location::Local, Location::Local) => return None,
            (Location::Remote(src), Location::Local) => {
                let mut args = src.scp_options();
                args.push(src.scp_operand(from_path));
                args.push(to_path.to_string());
                args
            }
            (Location::Local, Location::Remote(dst)) => {
                let mut args = dst.scp_options();
                args.push(from_path.to_string());
                args.push(dst.scp_operand(to_path));
                args
            }
            (Location::Remote(src), Location::Remote(dst)) => {
                // Route the data through this machine; the hosts need not
                // trust each other. Ports travel inside the URIs.
                let mut args = vec!["-3".to_string(), "-o".to_string(), "BatchMode=yes".to_string()];
                args.push("-o".to_string());
                args.push(format!(
                    "ConnectTimeout={}",
                    src.connect_timeout.max(dst.connect_timeout)
                ));
                for identity in [&src.identity_file, &dst.identity_file].into_iter().flatten() {
                    args.push("-i".to_string());
                    args.push(identity.clone());
                }
                args.push(src.scp_uri(from_path));
                args.push(dst.scp_uri(to_path));
                args
            }
        };
        Some(Invocation::new("scp", args))
    }
}

impl Transport for ScpTransport<'_> {
    fn copy(&self, from: &dyn Site, from_path: &str, to: &dyn Site, to_path: &str) -> SyncResult<()> {
        if let Some(parent) = parent_dir(to_path) {
            to.host().ensure_dir(&parent)?;
        }

        let Some(invocation) =
            Self::scp_invocation(from.host().location(), from_path, to.host().location(), to_path)
        else {
            debug!(from = from_path, to = to_path, "Local copy");
            if !Path::new(from_path).is_file() {
                return Err(SyncError::FileNotFound(from_path.to_string()));
            }
            fs::copy(from_path, to_path)?;
            return Ok(());
        };

        debug!(command = %invocation.display(), "Transferring snapshot");
        let output = self.runner.run(&invocation)?;
        output.check(&invocation).map(|_| ())
    }
}

/// Parent directory of a POSIX path.
fn parent_dir(path: &str) -> Option<String> {
    let (dir, _) = path.rsplit_once('/')?;
    if dir.is_empty() {
        return None;
    }
    Some(dir.to_string())
}
