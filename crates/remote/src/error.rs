//! Error types for remote session operations.
//!
//! A nonzero exit status is not an error at this layer: [`Session::run`]
//! hands it back to the caller. Only transport problems, timeouts and
//! `check`-style failures are represented here.
//!
//! [`Session::run`]: crate::Session::run

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to a remote host.
#[derive(Debug, Error)]
pub enum Error {
    /// The host could not be reached or refused the connection.
    #[error("could not connect to {host}: {message}")]
    Connect {
        /// Host that was being opened
        host: String,
        /// Transport-level reason
        message: String,
    },

    /// A single command exceeded its allotted time.
    ///
    /// The session stays usable after this error.
    #[error("command timed out after {}s on {host}: {command}", .after.as_secs())]
    Timeout {
        /// Host the command ran on
        host: String,
        /// The command line, space joined
        command: String,
        /// The timeout that expired
        after: Duration,
    },

    /// A `check`-style invocation exited nonzero.
    #[error("command failed on {host} with exit code {code}: {command}")]
    CommandFailed {
        /// Host the command ran on
        host: String,
        /// The command line, space joined
        command: String,
        /// Exit code reported by the command
        code: i32,
        /// Captured standard error lines
        stderr: Vec<String>,
    },

    /// The local helper process (ssh, sh) could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// A file primitive failed on the remote side.
    #[error("{operation} {path} failed on {host}: {message}")]
    File {
        /// Host the operation ran on
        host: String,
        /// Operation name (write, unlink, chmod, ...)
        operation: &'static str,
        /// Remote path
        path: String,
        /// Reason reported by the remote side
        message: String,
    },

    /// The session was used after it had been released.
    #[error("session for {0} was already released")]
    Released(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error is a per-command timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error means the host itself is unreachable.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_command() {
        let err = Error::Timeout {
            host: "node1".to_string(),
            command: "systemctl start ceph-mon@node1".to_string(),
            after: Duration::from_secs(7),
        };
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "command timed out after 7s on node1: systemctl start ceph-mon@node1"
        );
    }

    #[test]
    fn test_connect_is_not_timeout() {
        let err = Error::Connect {
            host: "node2".to_string(),
            message: "No route to host".to_string(),
        };
        assert!(err.is_connect());
        assert!(!err.is_timeout());
    }
}
