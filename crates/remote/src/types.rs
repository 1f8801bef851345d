//! Core types shared by every transport.

use std::fmt;
use std::str::FromStr;

/// A host to operate on, with an optional login user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostTarget {
    /// Hostname or address
    pub host: String,
    /// Login user, `None` uses the transport default
    pub user: Option<String>,
}

impl HostTarget {
    /// Create a target without an explicit user.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
        }
    }

    /// Set the login user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Fill in `user` from a fallback when the target did not name one.
    pub fn or_user(mut self, user: Option<&str>) -> Self {
        if self.user.is_none() {
            self.user = user.map(str::to_string);
        }
        self
    }

    /// `user@host` when a user is set, otherwise just the host.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host)
    }
}

impl FromStr for HostTarget {
    type Err = String;

    /// Parse `host` or `user@host`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (user, host) = match s.split_once('@') {
            Some((user, host)) => (Some(user), host),
            None => (None, s),
        };

        if host.is_empty() {
            return Err(format!("invalid host: '{s}'"));
        }
        if let Some(user) = user
            && user.is_empty()
        {
            return Err(format!("empty user in '{s}'"));
        }

        Ok(Self {
            host: host.to_string(),
            user: user.map(str::to_string),
        })
    }
}

/// Output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, split into lines
    pub stdout: Vec<String>,
    /// Standard error, split into lines
    pub stderr: Vec<String>,
    /// Exit code (-1 when the process was killed by a signal)
    pub code: i32,
}

impl CommandOutput {
    /// Build an output from raw bytes.
    pub fn from_bytes(stdout: &[u8], stderr: &[u8], code: i32) -> Self {
        Self {
            stdout: split_lines(stdout),
            stderr: split_lines(stderr),
            code,
        }
    }

    /// A successful output with the given stdout lines.
    pub fn ok<I, S>(stdout: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stdout: stdout.into_iter().map(Into::into).collect(),
            stderr: Vec::new(),
            code: 0,
        }
    }

    /// A failed output with the given exit code and stderr lines.
    pub fn failed<I, S>(code: i32, stderr: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into_iter().map(Into::into).collect(),
            code,
        }
    }

    /// Whether the command exited zero.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stdout joined back into a single string.
    pub fn stdout_str(&self) -> String {
        self.stdout.join("\n")
    }

    /// Stderr joined back into a single string.
    pub fn stderr_str(&self) -> String {
        self.stderr.join("\n")
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Join an argv for logs and error messages.
pub fn display_command(argv: &[&str]) -> String {
    argv.join(" ")
}
