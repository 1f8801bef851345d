//! Loading and atomically saving `<cluster>.conf`.
//!
//! A save writes `<path>.tmp`, flushes it, then moves it into place in one
//! step. The temp file is created exclusively: a leftover one from an
//! interrupted save is reported instead of being overwritten. If the
//! process dies between the two steps the destination still holds its
//! previous content.

use crate::error::{Error, Result};
use crate::store::ClusterConfig;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// How `save` treats an existing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Replace the destination (read-modify-write of an existing config)
    Replace,
    /// Fail with [`Error::AlreadyExists`] if the destination exists
    CreateNew,
}

/// Default config path for a cluster, relative to the working directory.
pub fn cluster_path(cluster: &str) -> PathBuf {
    PathBuf::from(format!("{cluster}.conf"))
}

/// Temp file used while saving `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Read a config file verbatim.
pub fn load_raw(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })
}

/// Load and parse a config file.
pub fn load(path: &Path) -> Result<ClusterConfig> {
    ClusterConfig::parse(&load_raw(path)?)
}

/// Atomically write `config` to `path`.
pub fn save(config: &ClusterConfig, path: &Path, mode: SaveMode) -> Result<()> {
    let tmp = temp_path(path);
    log::debug!("Writing config to {}", path.display());

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => Error::AlreadyExists(tmp.clone()),
            _ => Error::Io(e),
        })?;

    let written = file
        .write_all(config.to_string().as_bytes())
        .and_then(|()| file.sync_all());
    drop(file);
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }

    let moved = match mode {
        SaveMode::Replace => fs::rename(&tmp, path).map_err(Error::Io),
        // A hard link never replaces an existing destination.
        SaveMode::CreateNew => fs::hard_link(&tmp, path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_path_buf()),
                _ => Error::Io(e),
            })
            .and_then(|()| fs::remove_file(&tmp).map_err(Error::Io)),
    };

    if moved.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    moved
}
