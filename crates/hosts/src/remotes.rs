//! File helpers that run against a host's session.

use crate::error::{Error, Result};
use remote::Session;

/// Directory holding cluster configuration and keyrings.
pub const CONF_DIR: &str = "/etc/ceph";

/// Path of a cluster's configuration on a host.
pub fn conf_path(cluster: &str) -> String {
    format!("{CONF_DIR}/{cluster}.conf")
}

/// What `write_conf` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfWrite {
    /// The file did not exist or was replaced
    Written,
    /// The file already had this content
    Unchanged,
}

/// Log the line-level differences between two texts at debug level.
fn log_diff(host: &str, path: &str, old: &str, new: &str) {
    let diff = similar::TextDiff::from_lines(old, new);
    log::debug!("{host}: differences in {path}:");
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => log::debug!("{host}: - {}", change.to_string().trim_end()),
            similar::ChangeTag::Insert => log::debug!("{host}: + {}", change.to_string().trim_end()),
            similar::ChangeTag::Equal => {}
        }
    }
}

/// Write `/etc/ceph/<cluster>.conf`.
///
/// Existing identical content is left untouched. Differing content is only
/// replaced when `overwrite` is set; otherwise the differences are logged
/// and [`Error::ConfigDiffers`] is returned.
pub fn write_conf<S: Session + ?Sized>(
    session: &S,
    cluster: &str,
    content: &str,
    overwrite: bool,
) -> Result<ConfWrite> {
    let path = conf_path(cluster);
    session.makedir(CONF_DIR)?;

    if let Some(existing) = session.read_file(&path)? {
        if existing == content {
            log::debug!("{}: {path} is up to date", session.host());
            return Ok(ConfWrite::Unchanged);
        }
        if !overwrite {
            log_diff(session.host(), &path, &existing, content);
            return Err(Error::ConfigDiffers {
                host: session.host().to_string(),
                path,
            });
        }
    }

    session.write_file(&path, content)?;
    Ok(ConfWrite::Written)
}

/// Write a keyring with the given mode and ownership.
pub fn write_keyring<S: Session + ?Sized>(
    session: &S,
    path: &str,
    content: &str,
    mode: u32,
    owner: (&str, &str),
) -> Result<()> {
    if let Some((dir, _)) = path.rsplit_once('/')
        && !dir.is_empty()
    {
        session.makedir(dir)?;
    }
    session.write_file(path, content)?;
    session.chmod(path, mode)?;
    session.chown(path, owner.0, owner.1)?;
    Ok(())
}
