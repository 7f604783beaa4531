//! ssh / scp argument construction.

use crate::model::Access;

/// Default ssh `ConnectTimeout` in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// A remote shell endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
    pub connect_timeout: u64,
}

impl SshTarget {
    /// Build a target from an environment's access block.
    ///
    /// Returns `None` for local access.
    #[must_use]
    pub fn from_access(access: &Access, connect_timeout: u64) -> Option<Self> {
        match access {
            Access::Local => None,
            Access::Ssh {
                host,
                user,
                port,
                identity_file,
            } => Some(Self {
                host: host.clone(),
                user: user.clone().filter(|u| !u.trim().is_empty()),
                port: *port,
                identity_file: identity_file.clone().filter(|f| !f.trim().is_empty()),
                connect_timeout,
            }),
        }
    }

    /// `user@host` or `host`.
    #[must_use]
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// Options shared by ssh and scp: never prompt, bounded connect time.
    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args
    }

    /// Arguments for `ssh` running one remote command line.
    #[must_use]
    pub fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = self.common_options();
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(self.destination());
        args.push(remote_command.to_string());
        args
    }

    /// Options for `scp` talking to this target (`-P` for the port).
    #[must_use]
    pub fn scp_options(&self) -> Vec<String> {
        let mut args = self.common_options();
        if let Some(port) = self.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        args
    }

    /// `user@host:path` operand for scp.
    #[must_use]
    pub fn scp_operand(&self, path: &str) -> String {
        format!("{}:{path}", self.destination())
    }

    /// `scp://user@host:port/path` operand; carries the port per side, used
    /// when both ends of a copy are remote.
    #[must_use]
    pub fn scp_uri(&self, path: &str) -> String {
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        // The URI path is relative to the login directory; absolute paths
        // therefore appear with a doubled slash.
        format!("scp://{}{port}/{path}", self.destination())
    }
}

/// Quote a word for a POSIX shell.
#[must_use]
pub fn sh_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./=:@%+,".contains(&b))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Render a program and its arguments as one shell command line.
#[must_use]
pub fn shell_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    std::iter::once(sh_quote(program))
        .chain(args.iter().map(|a| sh_quote(a.as_ref())))
        .collect::<Vec<_>>()
        .join(" ")
}
