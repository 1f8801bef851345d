//! Generated systemd units for clusters with a non-default name.
//!
//! Packaged units only know the `ceph` cluster. For any other name we
//! install `ceph-<cluster>-<kind>@.service` templates under
//! [`UNIT_DIR`] before first use and remove them on teardown.

use crate::distro::{Host, InitSystem};
use crate::error::Result;
use remote::Session;
use std::fmt;

/// Directory generated unit files are installed into.
pub const UNIT_DIR: &str = "/etc/systemd/system";

/// Cluster name the packaged units serve.
pub const DEFAULT_CLUSTER: &str = "ceph";

/// Daemon kinds that run as templated units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonKind {
    /// Monitor
    Mon,
    /// Object storage daemon
    Osd,
    /// Metadata server
    Mds,
    /// Object gateway
    Radosgw,
}

impl DaemonKind {
    /// Every kind that gets a generated unit.
    pub const ALL: [Self; 4] = [Self::Mon, Self::Osd, Self::Mds, Self::Radosgw];

    /// Short name: `mon`, `osd`, `mds`, `radosgw`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mon => "mon",
            Self::Osd => "osd",
            Self::Mds => "mds",
            Self::Radosgw => "radosgw",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Mon => "Ceph cluster monitor daemon",
            Self::Osd => "Ceph object storage daemon",
            Self::Mds => "Ceph metadata server daemon",
            Self::Radosgw => "Ceph rados gateway",
        }
    }

    fn exec(&self) -> &'static str {
        match self {
            Self::Mon => "ExecStart=/usr/bin/ceph-mon -f --cluster ${CLUSTER} --id %i\n",
            Self::Osd => {
                "ExecStart=/usr/bin/ceph-osd -f --cluster ${CLUSTER} --id %i\n\
                 ExecStartPre=/usr/lib/ceph/ceph-osd-prestart.sh --cluster ${CLUSTER} --id %i\n"
            }
            Self::Mds => "ExecStart=/usr/bin/ceph-mds -f --cluster ${CLUSTER} --id %i\n",
            Self::Radosgw => "ExecStart=/usr/bin/radosgw -f --cluster ${CLUSTER} --name client.%i\n",
        }
    }
}

impl fmt::Display for DaemonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instance unit name: `ceph-mon@a`, or `ceph-backup-mon@a` for cluster `backup`.
pub fn unit_name(cluster: &str, kind: DaemonKind, instance: &str) -> String {
    if cluster == DEFAULT_CLUSTER {
        format!("ceph-{kind}@{instance}")
    } else {
        format!("ceph-{cluster}-{kind}@{instance}")
    }
}

/// Unit instance for a daemon id. Gateway units run `client.%i`, so their
/// instance carries the `radosgw.` prefix of the entity name.
pub fn instance_id(kind: DaemonKind, id: &str) -> String {
    match kind {
        DaemonKind::Radosgw => format!("radosgw.{id}"),
        _ => id.to_string(),
    }
}

/// Template file name for a generated unit.
pub fn unit_file_name(cluster: &str, kind: DaemonKind) -> String {
    format!("ceph-{cluster}-{kind}@.service")
}

/// Full path of a generated unit template.
pub fn unit_file_path(cluster: &str, kind: DaemonKind) -> String {
    format!("{UNIT_DIR}/{}", unit_file_name(cluster, kind))
}

/// Content of a generated unit template.
pub fn unit_content(cluster: &str, kind: DaemonKind) -> String {
    format!(
        "[Unit]\n\
         Description={}\n\
         After=network-online.target local-fs.target\n\
         Wants=network-online.target local-fs.target\n\
         PartOf=ceph.target\n\
         \n\
         [Service]\n\
         EnvironmentFile=-/etc/sysconfig/ceph\n\
         Environment=CLUSTER={cluster}\n\
         {}\
         \n\
         [Install]\n\
         WantedBy=ceph.target\n",
        kind.description(),
        kind.exec()
    )
}

/// What a build-up or teardown changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitChanges {
    /// Unit files written or removed
    pub files: Vec<String>,
    /// Whether `systemctl daemon-reload` ran
    pub reloaded: bool,
}

fn needs_units(host: &Host, cluster: &str) -> bool {
    host.distro.init == InitSystem::Systemd && cluster != DEFAULT_CLUSTER
}

fn daemon_reload(session: &dyn Session) -> Result<bool> {
    let out = session.run(&["systemctl", "daemon-reload"], None)?;
    if !out.success() {
        log::warn!("{}: failed executing 'systemctl daemon-reload'", session.host());
    }
    Ok(out.success())
}

/// Install missing unit templates for `cluster`.
///
/// Does nothing on sysvinit hosts and for the default cluster. Existing
/// files are left alone; the daemon is reloaded only when a file was written.
pub fn build_up(host: &Host, cluster: &str) -> Result<UnitChanges> {
    let mut changes = UnitChanges::default();
    if !needs_units(host, cluster) {
        return Ok(changes);
    }

    let session: &dyn Session = &**host.conn();
    for kind in DaemonKind::ALL {
        let path = unit_file_path(cluster, kind);
        if session.path_exists(&path)? {
            continue;
        }
        log::debug!("{}: writing {path}", host.hostname());
        session.write_file(&path, &unit_content(cluster, kind))?;
        changes.files.push(path);
    }

    if !changes.files.is_empty() {
        changes.reloaded = daemon_reload(session)?;
    }
    Ok(changes)
}

/// Remove generated unit templates for `cluster`.
pub fn teardown(host: &Host, cluster: &str) -> Result<UnitChanges> {
    let mut changes = UnitChanges::default();
    if !needs_units(host, cluster) {
        return Ok(changes);
    }

    let session: &dyn Session = &**host.conn();
    if !session.path_exists(UNIT_DIR)? {
        return Ok(changes);
    }

    for kind in DaemonKind::ALL {
        let path = unit_file_path(cluster, kind);
        if !session.path_exists(&path)? {
            continue;
        }
        log::debug!("{}: removing {path}", host.hostname());
        session.unlink(&path)?;
        changes.files.push(path);
    }

    if !changes.files.is_empty() {
        changes.reloaded = daemon_reload(session)?;
    }
    Ok(changes)
}
