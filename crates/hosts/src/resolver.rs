//! Identify a host and resolve its capability descriptor.

use crate::distro::Host;
use crate::error::{Error, Result};
use crate::registry::{self, Identity};
use remote::{Connector, HostTarget, Session, check};
use std::time::Duration;

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse `/etc/os-release` content into `(key, value)` pairs.
fn parse_os_release(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| {
            let v = v.trim().trim_matches('"').trim_matches('\'');
            (k.trim().to_string(), v.to_string())
        })
        .collect()
}

fn identity_from_os_release(content: &str) -> Option<Identity> {
    let fields = parse_os_release(content);
    let get = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };

    let name = get("NAME");
    let release = get("VERSION_ID");
    if name.is_empty() || release.is_empty() {
        return None;
    }

    // VERSION="7 (Core)" carries the codename when VERSION_CODENAME is absent.
    let mut codename = get("VERSION_CODENAME");
    if codename.is_empty() {
        let version = get("VERSION");
        if let Some((_, rest)) = version.split_once('(') {
            codename = rest.trim_end_matches(')').trim().to_string();
        }
    }

    Some(Identity {
        name,
        id: get("ID"),
        release,
        codename,
        machine_type: String::new(),
    })
}

fn identity_from_lsb(lines: &[String]) -> Option<Identity> {
    let mut lines = lines.iter().map(|l| l.trim().trim_matches('"'));
    let name = lines.next().filter(|s| !s.is_empty())?;
    let release = lines.next().filter(|s| !s.is_empty())?;
    let codename = lines.next().unwrap_or_default();
    Some(Identity {
        name: name.to_string(),
        id: String::new(),
        release: release.to_string(),
        codename: codename.to_string(),
        machine_type: String::new(),
    })
}

/// Ask a host who it is.
pub fn identify<S: Session + ?Sized>(session: &S) -> Result<Identity> {
    let from_os_release = session
        .read_file("/etc/os-release")?
        .as_deref()
        .and_then(identity_from_os_release);

    let mut identity = match from_os_release {
        Some(identity) => identity,
        None => {
            log::debug!("{}: no usable /etc/os-release, trying lsb_release", session.host());
            let out = session.run(&["lsb_release", "-s", "-i", "-r", "-c"], Some(IDENTIFY_TIMEOUT))?;
            identity_from_lsb(&out.stdout)
                .filter(|_| out.success())
                .ok_or_else(|| Error::Undetected {
                    host: session.host().to_string(),
                    message: "neither /etc/os-release nor lsb_release identified the distro"
                        .to_string(),
                })?
        }
    };

    let machine = check(session, &["uname", "-m"], Some(IDENTIFY_TIMEOUT))?;
    identity.machine_type = machine
        .stdout
        .first()
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    Ok(identity)
}

/// Connect to a host and resolve its capabilities.
///
/// The returned [`Host`] owns the connection. When resolution fails, the
/// connection is released before the error is returned.
pub fn get<C: Connector + ?Sized>(connector: &C, target: &HostTarget) -> Result<Host> {
    let conn = connector.open(target)?;

    match identify(&*conn).and_then(|identity| registry::resolve(&identity)) {
        Ok(distro) => {
            log::info!("{}: distro info: {distro}", target.host);
            log::debug!(
                "{}: init {}, packages via {}",
                target.host,
                distro.init,
                distro.package_manager
            );
            Ok(Host::new(distro, conn))
        }
        Err(e) => {
            if let Err(release_err) = conn.release() {
                log::warn!("{}: failed to release session: {release_err}", target.host);
            }
            Err(e)
        }
    }
}
