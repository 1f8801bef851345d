//! Process-backed sessions: `ssh` for remote hosts, direct execution for
//! the machine we are running on.
//!
//! Every primitive is a short-lived child process. Remote command lines are
//! quoted with `shell-words` so arguments survive the remote shell intact.
//! SSH sessions share one multiplexed master connection, which is closed
//! on release.

use crate::error::{Error, Result};
use crate::session::{Connection, Connector, Session};
use crate::types::{CommandOutput, HostTarget, display_command};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Exit code the file helpers use for "path does not exist".
const MISSING: i32 = 3;

/// Opens sessions over `ssh`, or locally when the target is this machine.
#[derive(Debug, Clone)]
pub struct SshConnector {
    ssh_program: String,
    connect_timeout: Duration,
    options: Vec<String>,
    local_names: Vec<String>,
}

impl SshConnector {
    /// Create a connector using `ssh` from `PATH`.
    pub fn new() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            connect_timeout: Duration::from_secs(10),
            options: Vec::new(),
            local_names: local_hostnames(),
        }
    }

    /// Override the ssh executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Set how long to wait for the initial connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add an `-o key=value` option passed to every ssh invocation.
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    fn is_local(&self, target: &HostTarget) -> bool {
        target.user.is_none() && self.local_names.iter().any(|n| n == &target.host)
    }

    fn control_path(target: &HostTarget) -> PathBuf {
        std::env::temp_dir().join(format!(
            "cephdeploy-{}.sock",
            target.destination().replace(['/', ':'], "_")
        ))
    }

    fn ssh_prefix(&self, target: &HostTarget) -> Vec<String> {
        let mut prefix = vec![
            self.ssh_program.clone(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", Self::control_path(target).display()),
            "-o".to_string(),
            "ControlPersist=60".to_string(),
        ];
        for option in &self.options {
            prefix.push("-o".to_string());
            prefix.push(option.clone());
        }
        if let Some(user) = &target.user {
            prefix.push("-l".to_string());
            prefix.push(user.clone());
        }
        prefix.push(target.host.clone());
        prefix.push("--".to_string());
        prefix
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for SshConnector {
    fn open(&self, target: &HostTarget) -> Result<Connection> {
        let session = if self.is_local(target) {
            log::debug!("{}: using local execution", target.host);
            ProcessSession::local(&target.host)
        } else {
            log::debug!("{}: connecting over ssh", target.host);
            ProcessSession {
                host: target.host.clone(),
                prefix: self.ssh_prefix(target),
                control_path: Some(Self::control_path(target)),
            }
        };

        // 255 is what ssh reports for its own failures.
        let answer_timeout = self.connect_timeout + Duration::from_secs(5);
        match session.exec(&["true"], None, Some(answer_timeout)) {
            Ok(out) if out.success() => Ok(Connection::new(Box::new(session))),
            Ok(out) => Err(Error::Connect {
                host: target.host.clone(),
                message: if out.stderr.is_empty() {
                    format!("exit code {}", out.code)
                } else {
                    out.stderr_str()
                },
            }),
            Err(Error::Timeout { .. }) => Err(Error::Connect {
                host: target.host.clone(),
                message: format!("no answer within {}s", answer_timeout.as_secs()),
            }),
            Err(e) => Err(e),
        }
    }
}

/// A session whose primitives run as child processes.
#[derive(Debug)]
pub struct ProcessSession {
    host: String,
    prefix: Vec<String>,
    control_path: Option<PathBuf>,
}

impl ProcessSession {
    /// A session that executes directly on this machine.
    pub fn local(host: &str) -> Self {
        Self {
            host: host.to_string(),
            prefix: Vec::new(),
            control_path: None,
        }
    }

    fn command_for(&self, argv: &[&str]) -> Result<Command> {
        if self.prefix.is_empty() {
            let (program, args) = argv.split_first().ok_or_else(|| Error::Spawn {
                program: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            })?;
            let mut cmd = Command::new(program);
            cmd.args(args);
            Ok(cmd)
        } else {
            let mut cmd = Command::new(&self.prefix[0]);
            cmd.args(&self.prefix[1..]);
            cmd.arg(shell_words::join(argv));
            Ok(cmd)
        }
    }

    fn exec(
        &self,
        argv: &[&str],
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        let raw = self.exec_raw(argv, stdin, timeout)?;
        Ok(CommandOutput::from_bytes(&raw.stdout, &raw.stderr, raw.code))
    }

    /// Run a child and keep its output bytes as they came.
    fn exec_raw(
        &self,
        argv: &[&str],
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<RawOutput> {
        log::trace!("{}: running {}", self.host, display_command(argv));

        let mut cmd = self.command_for(argv)?;
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let program = argv.first().copied().unwrap_or_default().to_string();
        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

        if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(data)?;
        }

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let code = match wait(&mut child, timeout)? {
            Some(code) => code,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Timeout {
                    host: self.host.clone(),
                    command: display_command(argv),
                    after: timeout.unwrap_or_default(),
                });
            }
        };

        Ok(RawOutput {
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
            code,
        })
    }

    fn file_op(&self, operation: &'static str, path: &str, argv: &[&str]) -> Result<CommandOutput> {
        let out = self.exec(argv, None, None)?;
        if out.success() {
            return Ok(out);
        }
        Err(Error::File {
            host: self.host.clone(),
            operation,
            path: path.to_string(),
            message: out.stderr_str(),
        })
    }
}

struct RawOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    code: i32,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Wait for the child; `Ok(None)` means the timeout expired.
fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<Option<i32>> {
    let Some(timeout) = timeout else {
        let status = child.wait()?;
        return Ok(Some(status.code().unwrap_or(-1)));
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status.code().unwrap_or(-1)));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl Session for ProcessSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn run(&self, argv: &[&str], timeout: Option<Duration>) -> Result<CommandOutput> {
        self.exec(argv, None, timeout)
    }

    fn read_file(&self, path: &str) -> Result<Option<String>> {
        let script = format!("test -e \"$1\" || exit {MISSING}; cat -- \"$1\"");
        let out = self.exec_raw(&["sh", "-c", &script, "sh", path], None, None)?;
        let failed = |message: String| Error::File {
            host: self.host.clone(),
            operation: "read",
            path: path.to_string(),
            message,
        };
        match out.code {
            0 => String::from_utf8(out.stdout)
                .map(Some)
                .map_err(|e| failed(format!("not valid UTF-8: {e}"))),
            MISSING => Ok(None),
            _ => Err(failed(String::from_utf8_lossy(&out.stderr).trim().to_string())),
        }
    }

    fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let script = "cat > \"$1.tmp\" && mv -f -- \"$1.tmp\" \"$1\"";
        let out = self.exec(
            &["sh", "-c", script, "sh", path],
            Some(content.as_bytes()),
            None,
        )?;
        if out.success() {
            return Ok(());
        }
        Err(Error::File {
            host: self.host.clone(),
            operation: "write",
            path: path.to_string(),
            message: out.stderr_str(),
        })
    }

    fn path_exists(&self, path: &str) -> Result<bool> {
        Ok(self.exec(&["test", "-e", path], None, None)?.success())
    }

    fn unlink(&self, path: &str) -> Result<()> {
        self.file_op("unlink", path, &["rm", "--", path]).map(|_| ())
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let mode = format!("{mode:o}");
        self.file_op("chmod", path, &["chmod", &mode, "--", path])
            .map(|_| ())
    }

    fn chown(&self, path: &str, user: &str, group: &str) -> Result<()> {
        let owner = format!("{user}:{group}");
        self.file_op("chown", path, &["chown", &owner, "--", path])
            .map(|_| ())
    }

    fn makedir(&self, path: &str) -> Result<()> {
        self.file_op("mkdir", path, &["mkdir", "-p", "--", path])
            .map(|_| ())
    }

    fn listdir(&self, path: &str) -> Result<Vec<String>> {
        let out = self.file_op("listdir", path, &["ls", "-1A", "--", path])?;
        Ok(out
            .stdout
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect())
    }

    fn release(&mut self) -> Result<()> {
        let Some(control_path) = self.control_path.take() else {
            return Ok(());
        };
        if !control_path.exists() {
            return Ok(());
        }

        let program = self.prefix.first().cloned().unwrap_or_else(|| "ssh".to_string());
        let status = Command::new(&program)
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .args(["-O", "exit", &self.host])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| Error::Spawn { program, source })?;

        if !status.success() {
            log::debug!("{}: control master already gone", self.host);
        }
        Ok(())
    }
}

/// Names this machine answers to.
fn local_hostnames() -> Vec<String> {
    let mut names = vec!["localhost".to_string(), "127.0.0.1".to_string()];

    let hostname = std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            Command::new("hostname")
                .output()
                .ok()
                .filter(|o| o.status.success())
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        });

    if let Some(name) = hostname {
        if let Some((short, _)) = name.split_once('.') {
            names.push(short.to_string());
        }
        names.push(name);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_run_captures_output_and_code() {
        let session = ProcessSession::local("localhost");
        let out = session
            .run(&["sh", "-c", "echo out; echo err >&2; exit 4"], None)
            .unwrap();
        assert_eq!(out.stdout, vec!["out"]);
        assert_eq!(out.stderr, vec!["err"]);
        assert_eq!(out.code, 4);
    }

    #[test]
    fn test_local_timeout_then_session_still_usable() {
        let session = ProcessSession::local("localhost");
        let err = session
            .run(&["sleep", "5"], Some(Duration::from_millis(100)))
            .unwrap_err();
        assert!(err.is_timeout());

        let out = session.run(&["true"], None).unwrap();
        assert!(out.success());
    }

    #[test]
    fn test_local_file_primitives() {
        let dir = tempfile::tempdir().unwrap();
        let session = ProcessSession::local("localhost");
        let sub = dir.path().join("etc/ceph");
        let sub = sub.to_str().unwrap();
        let file = format!("{sub}/ceph.conf");

        session.makedir(sub).unwrap();
        session.makedir(sub).unwrap();
        assert_eq!(session.read_file(&file).unwrap(), None);

        session.write_file(&file, "[global]\nfsid = 1\n").unwrap();
        assert!(session.path_exists(&file).unwrap());
        assert_eq!(
            session.read_file(&file).unwrap().as_deref(),
            Some("[global]\nfsid = 1\n")
        );
        assert_eq!(session.listdir(sub).unwrap(), vec!["ceph.conf"]);

        session.chmod(&file, 0o640).unwrap();
        session.unlink(&file).unwrap();
        assert!(!session.path_exists(&file).unwrap());
        assert!(session.unlink(&file).is_err());
    }

    #[test]
    fn test_local_read_keeps_content_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let session = ProcessSession::local("localhost");
        let file = dir.path().join("keyring");
        let file = file.to_str().unwrap();

        session.write_file(file, "[client.admin]\n\tkey = AQ==").unwrap();
        assert_eq!(
            session.read_file(file).unwrap().as_deref(),
            Some("[client.admin]\n\tkey = AQ==")
        );

        session.write_file(file, "a\r\n\n\n").unwrap();
        assert_eq!(session.read_file(file).unwrap().as_deref(), Some("a\r\n\n\n"));
    }

    #[test]
    fn test_local_read_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, [0x66, 0x6f, 0xff, 0x0a]).unwrap();

        let session = ProcessSession::local("localhost");
        let err = session.read_file(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_ssh_prefix_ends_with_host_and_separator() {
        let connector = SshConnector::new().with_option("StrictHostKeyChecking=no");
        let target = HostTarget::new("node1").with_user("ceph");
        let prefix = connector.ssh_prefix(&target);

        assert_eq!(prefix.first().map(String::as_str), Some("ssh"));
        assert!(prefix.contains(&"BatchMode=yes".to_string()));
        assert!(prefix.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(prefix.windows(2).any(|w| w[0] == "-l" && w[1] == "ceph"));
        assert_eq!(prefix[prefix.len() - 2], "node1");
        assert_eq!(prefix[prefix.len() - 1], "--");
    }

    #[test]
    fn test_localhost_is_local_unless_user_given() {
        let connector = SshConnector::new();
        assert!(connector.is_local(&HostTarget::new("localhost")));
        assert!(!connector.is_local(&HostTarget::new("localhost").with_user("root")));
        assert!(!connector.is_local(&HostTarget::new("node-that-is-not-here")));
    }
}
