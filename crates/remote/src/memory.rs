//! In-memory hosts for exercising remote logic without a network.
//!
//! A [`MemoryHost`] holds a small filesystem, scripted command responses and
//! a log of everything that was run against it. Clones share state, so a
//! test can keep a handle, hand another to a [`MemoryConnector`], and
//! inspect the host after the code under test has released its session.
//!
//! Commands with no scripted response succeed with empty output, except
//! `rm -rf`, which removes matching paths from the in-memory filesystem.

use crate::error::{Error, Result};
use crate::session::{Connection, Connector, Session};
use crate::types::{CommandOutput, HostTarget, display_command};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Response {
    Output(CommandOutput),
    Timeout,
}

#[derive(Debug, Default)]
struct HostState {
    name: String,
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    modes: BTreeMap<String, u32>,
    owners: BTreeMap<String, (String, String)>,
    responses: Vec<(Vec<String>, Response)>,
    commands: Vec<Vec<String>>,
    writes: Vec<String>,
    unlinks: Vec<String>,
    opens: usize,
    releases: usize,
    unreachable: bool,
}

impl HostState {
    fn response_for(&self, argv: &[&str]) -> Option<Response> {
        let exact = self
            .responses
            .iter()
            .rev()
            .find(|(rule, _)| rule.len() == argv.len() && rule.iter().zip(argv).all(|(a, b)| a == b));
        if let Some((_, response)) = exact {
            return Some(response.clone());
        }
        self.responses
            .iter()
            .rev()
            .find(|(rule, _)| {
                rule.len() <= argv.len() && rule.iter().zip(argv).all(|(a, b)| a == b)
            })
            .map(|(_, response)| response.clone())
    }

    fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        if self.files.contains_key(&path) || self.dirs.contains(&path) {
            return true;
        }
        let prefix = format!("{path}/");
        self.files.keys().any(|f| f.starts_with(&prefix))
            || self.dirs.iter().any(|d| d.starts_with(&prefix))
    }

    fn remove_tree(&mut self, path: &str) {
        let path = normalize(path);
        let prefix = format!("{path}/");
        self.files
            .retain(|f, _| f != &path && !f.starts_with(&prefix));
        self.dirs.retain(|d| d != &path && !d.starts_with(&prefix));
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.replace("//", "/")
    }
}

/// A scripted, in-memory host.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    state: Arc<Mutex<HostState>>,
}

impl MemoryHost {
    /// Create a reachable host with an empty filesystem.
    pub fn new(name: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                name: name.to_string(),
                ..HostState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hostname this host answers to.
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// Make every connection attempt fail.
    pub fn unreachable(self) -> Self {
        self.lock().unreachable = true;
        self
    }

    /// Script the output of a command.
    ///
    /// `argv` matches exactly, or as a prefix when no exact rule exists.
    /// Later rules win over earlier ones.
    pub fn respond(&self, argv: &[&str], output: CommandOutput) {
        self.lock().responses.push((
            argv.iter().map(|s| (*s).to_string()).collect(),
            Response::Output(output),
        ));
    }

    /// Script a command to exceed its timeout.
    pub fn time_out(&self, argv: &[&str]) {
        self.lock().responses.push((
            argv.iter().map(|s| (*s).to_string()).collect(),
            Response::Timeout,
        ));
    }

    /// Seed a file.
    pub fn add_file(&self, path: &str, content: &str) {
        self.lock()
            .files
            .insert(normalize(path), content.to_string());
    }

    /// Seed a directory.
    pub fn add_dir(&self, path: &str) {
        self.lock().dirs.insert(normalize(path));
    }

    /// Current content of a file.
    pub fn file(&self, path: &str) -> Option<String> {
        self.lock().files.get(&normalize(path)).cloned()
    }

    /// Whether a path exists.
    pub fn exists(&self, path: &str) -> bool {
        self.lock().exists(path)
    }

    /// Permission bits last set on a path.
    pub fn mode(&self, path: &str) -> Option<u32> {
        self.lock().modes.get(&normalize(path)).copied()
    }

    /// Owner and group last set on a path.
    pub fn owner(&self, path: &str) -> Option<(String, String)> {
        self.lock().owners.get(&normalize(path)).cloned()
    }

    /// Every command run so far, space joined, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.iter().map(|c| c.join(" ")).collect()
    }

    /// Paths written through `write_file`, in order.
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    /// Paths removed through `unlink`, in order.
    pub fn unlinks(&self) -> Vec<String> {
        self.lock().unlinks.clone()
    }

    /// How many sessions were released.
    pub fn release_count(&self) -> usize {
        self.lock().releases
    }

    /// How many sessions were opened.
    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    /// Sessions opened but not yet released.
    pub fn open_sessions(&self) -> usize {
        let state = self.lock();
        state.opens - state.releases
    }
}

/// A connector that serves [`MemoryHost`]s by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    hosts: BTreeMap<String, MemoryHost>,
}

impl MemoryConnector {
    /// Create a connector with no hosts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host.
    pub fn with_host(mut self, host: MemoryHost) -> Self {
        self.hosts.insert(host.name(), host);
        self
    }

    /// Look up a registered host.
    pub fn host(&self, name: &str) -> Option<&MemoryHost> {
        self.hosts.get(name)
    }
}

impl Connector for MemoryConnector {
    fn open(&self, target: &HostTarget) -> Result<Connection> {
        let host = self.hosts.get(&target.host).ok_or_else(|| Error::Connect {
            host: target.host.clone(),
            message: "Name or service not known".to_string(),
        })?;

        {
            let mut state = host.lock();
            if state.unreachable {
                return Err(Error::Connect {
                    host: target.host.clone(),
                    message: "No route to host".to_string(),
                });
            }
            state.opens += 1;
        }

        Ok(Connection::new(Box::new(MemorySession {
            name: target.host.clone(),
            host: host.clone(),
            released: false,
        })))
    }
}

struct MemorySession {
    name: String,
    host: MemoryHost,
    released: bool,
}

impl MemorySession {
    fn state(&self) -> Result<MutexGuard<'_, HostState>> {
        if self.released {
            return Err(Error::Released(self.name.clone()));
        }
        Ok(self.host.lock())
    }
}

impl Session for MemorySession {
    fn host(&self) -> &str {
        &self.name
    }

    fn run(&self, argv: &[&str], timeout: Option<Duration>) -> Result<CommandOutput> {
        let mut state = self.state()?;
        state
            .commands
            .push(argv.iter().map(|s| (*s).to_string()).collect());

        match state.response_for(argv) {
            Some(Response::Output(output)) => Ok(output),
            Some(Response::Timeout) => Err(Error::Timeout {
                host: self.name.clone(),
                command: display_command(argv),
                after: timeout.unwrap_or(Duration::ZERO),
            }),
            None => {
                if argv.first() == Some(&"rm") {
                    for path in argv.iter().skip(1).filter(|a| !a.starts_with('-')) {
                        state.remove_tree(path);
                    }
                }
                Ok(CommandOutput::default())
            }
        }
    }

    fn read_file(&self, path: &str) -> Result<Option<String>> {
        Ok(self.state()?.files.get(&normalize(path)).cloned())
    }

    fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let mut state = self.state()?;
        let path = normalize(path);
        state.writes.push(path.clone());
        state.files.insert(path, content.to_string());
        Ok(())
    }

    fn path_exists(&self, path: &str) -> Result<bool> {
        Ok(self.state()?.exists(path))
    }

    fn unlink(&self, path: &str) -> Result<()> {
        let mut state = self.state()?;
        let path = normalize(path);
        if state.files.remove(&path).is_none() {
            return Err(Error::File {
                host: self.name.clone(),
                operation: "unlink",
                path,
                message: "No such file or directory".to_string(),
            });
        }
        state.unlinks.push(path);
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let mut state = self.state()?;
        state.modes.insert(normalize(path), mode);
        Ok(())
    }

    fn chown(&self, path: &str, user: &str, group: &str) -> Result<()> {
        let mut state = self.state()?;
        state
            .owners
            .insert(normalize(path), (user.to_string(), group.to_string()));
        Ok(())
    }

    fn makedir(&self, path: &str) -> Result<()> {
        self.state()?.dirs.insert(normalize(path));
        Ok(())
    }

    fn listdir(&self, path: &str) -> Result<Vec<String>> {
        let state = self.state()?;
        let dir = normalize(path);
        if !state.exists(&dir) {
            return Err(Error::File {
                host: self.name.clone(),
                operation: "listdir",
                path: dir,
                message: "No such file or directory".to_string(),
            });
        }
        let prefix = if dir == "/" { dir.clone() } else { format!("{dir}/") };
        let names: BTreeSet<String> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }

    fn release(&mut self) -> Result<()> {
        self.host.lock().releases += 1;
        self.released = true;
        Ok(())
    }
}
