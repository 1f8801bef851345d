//! The session abstraction and its scoped owner.
//!
//! A [`Session`] is one live connection to one host. Callers never hold a
//! bare session: [`Connector::open`] hands back a [`Connection`], which
//! releases the session exactly once, either explicitly through
//! [`Connection::release`] or on drop.

use crate::error::{Error, Result};
use crate::types::{CommandOutput, HostTarget, display_command};
use std::ops::Deref;
use std::time::Duration;

/// Command execution and file primitives on one host.
///
/// [`run`](Session::run) never fails because of a nonzero exit code; the
/// caller inspects [`CommandOutput::code`]. Use [`check`] when a nonzero exit
/// should be treated as a failure.
pub trait Session {
    /// Host this session is connected to.
    fn host(&self) -> &str;

    /// Run a command, optionally bounded by a timeout.
    fn run(&self, argv: &[&str], timeout: Option<Duration>) -> Result<CommandOutput>;

    /// Read a file. Returns `None` when the file does not exist.
    fn read_file(&self, path: &str) -> Result<Option<String>>;

    /// Write (create or replace) a file.
    fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Check whether a path exists.
    fn path_exists(&self, path: &str) -> Result<bool>;

    /// Remove a file.
    fn unlink(&self, path: &str) -> Result<()>;

    /// Change permission bits of a path.
    fn chmod(&self, path: &str, mode: u32) -> Result<()>;

    /// Change owner and group of a path.
    fn chown(&self, path: &str, user: &str, group: &str) -> Result<()>;

    /// Create a directory and its parents. An existing directory is fine.
    fn makedir(&self, path: &str) -> Result<()>;

    /// List entry names in a directory.
    fn listdir(&self, path: &str) -> Result<Vec<String>>;

    /// Tear down the underlying connection.
    ///
    /// Called once by [`Connection`]; implementations do not need to guard
    /// against repeated calls.
    fn release(&mut self) -> Result<()>;

    /// Locate an executable on the remote `PATH`.
    fn which(&self, program: &str) -> Result<Option<String>> {
        let output = self.run(&["which", program], None)?;
        if !output.success() {
            return Ok(None);
        }
        Ok(output
            .stdout
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
            .map(str::to_string))
    }

    /// Short hostname as the remote host sees itself.
    fn shortname(&self) -> Result<String> {
        let output = check(self, &["hostname", "-s"], None)?;
        output
            .stdout
            .first()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::CommandFailed {
                host: self.host().to_string(),
                command: "hostname -s".to_string(),
                code: 0,
                stderr: vec!["empty hostname".to_string()],
            })
    }
}

/// Opens sessions to hosts.
pub trait Connector {
    /// Open a connection to `target`.
    ///
    /// Fails with [`Error::Connect`] when the host is unreachable.
    fn open(&self, target: &HostTarget) -> Result<Connection>;
}

/// Run a command and treat a nonzero exit as a failure.
///
/// Stderr and stdout are logged before the error is returned, so the
/// caller does not need to print them again.
pub fn check<S: Session + ?Sized>(
    session: &S,
    argv: &[&str],
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    let output = session.run(argv, timeout)?;
    if output.success() {
        return Ok(output);
    }

    let host = session.host();
    for line in &output.stderr {
        log::error!("{host}: {line}");
    }
    for line in &output.stdout {
        log::error!("{host}: {line}");
    }
    log::error!("{host}: exit code from command was: {}", output.code);

    Err(Error::CommandFailed {
        host: host.to_string(),
        command: display_command(argv),
        code: output.code,
        stderr: output.stderr,
    })
}

/// Owner of one live session.
///
/// Dereferences to the session. The session is released exactly once:
/// by [`release`](Connection::release), or by `Drop` on any other path
/// (early return, `?`, panic unwinding).
pub struct Connection {
    session: Box<dyn Session>,
    released: bool,
}

impl Connection {
    /// Take ownership of a freshly opened session.
    pub fn new(session: Box<dyn Session>) -> Self {
        Self {
            session,
            released: false,
        }
    }

    /// Borrow the session.
    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    /// Release the session now and report any teardown error.
    pub fn release(mut self) -> Result<()> {
        self.release_once()
    }

    fn release_once(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        log::debug!("{}: releasing session", self.session.host());
        self.session.release()
    }
}

impl Deref for Connection {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.release_once() {
            log::warn!("{}: failed to release session: {e}", self.session.host());
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.session.host())
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryHost};

    #[test]
    fn test_check_turns_nonzero_exit_into_error() {
        let host = MemoryHost::new("node1");
        host.respond(&["false"], CommandOutput::failed(1, ["boom"]));
        let connector = MemoryConnector::new().with_host(host);

        let conn = connector.open(&HostTarget::new("node1")).unwrap();
        let err = check(&*conn, &["false"], None).unwrap_err();
        match err {
            Error::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 1);
                assert_eq!(stderr, vec!["boom"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_does_not_fail_on_nonzero_exit() {
        let host = MemoryHost::new("node1");
        host.respond(&["false"], CommandOutput::failed(3, Vec::<String>::new()));
        let connector = MemoryConnector::new().with_host(host);

        let conn = connector.open(&HostTarget::new("node1")).unwrap();
        let out = conn.run(&["false"], None).unwrap();
        assert_eq!(out.code, 3);
    }

    #[test]
    fn test_connection_releases_once_on_explicit_release() {
        let host = MemoryHost::new("node1");
        let connector = MemoryConnector::new().with_host(host.clone());

        let conn = connector.open(&HostTarget::new("node1")).unwrap();
        conn.release().unwrap();
        assert_eq!(host.release_count(), 1);
    }

    #[test]
    fn test_connection_releases_on_drop_after_error() {
        let host = MemoryHost::new("node1");
        host.respond(&["false"], CommandOutput::failed(1, ["nope"]));
        let connector = MemoryConnector::new().with_host(host.clone());

        let attempt = || -> Result<()> {
            let conn = connector.open(&HostTarget::new("node1"))?;
            check(&*conn, &["false"], None)?;
            Ok(())
        };

        assert!(attempt().is_err());
        assert_eq!(host.release_count(), 1);
        assert_eq!(host.open_sessions(), 0);
    }

    #[test]
    fn test_which_and_shortname() {
        let host = MemoryHost::new("node1.example.com");
        host.respond(&["which", "ceph"], CommandOutput::ok(["/usr/bin/ceph"]));
        host.respond(&["hostname", "-s"], CommandOutput::ok(["node1"]));
        let connector = MemoryConnector::new().with_host(host);

        let conn = connector
            .open(&HostTarget::new("node1.example.com"))
            .unwrap();
        assert_eq!(conn.which("ceph").unwrap().as_deref(), Some("/usr/bin/ceph"));
        assert_eq!(conn.which("radosgw").unwrap(), None);
        assert_eq!(conn.shortname().unwrap(), "node1");
    }
}
