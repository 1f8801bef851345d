//! Service lifecycle: enable, start, stop, disable.
//!
//! Every (verb, unit) call is independent. A failed call is logged with its
//! unit and verb, recorded in the [`LifecycleReport`], and the controller
//! moves on; nothing is retried.

use crate::distro::{Host, InitSystem, PackageManager};
use crate::error::{Error, Result};
use crate::systemd::{self, DEFAULT_CLUSTER, DaemonKind};
use std::fmt;
use std::time::Duration;

/// Timeout for a single lifecycle call.
pub const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(7);

/// A lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Start at boot
    Enable,
    /// Start now
    Start,
    /// Stop now
    Stop,
    /// Do not start at boot
    Disable,
    /// Query whether running
    Status,
}

impl Verb {
    /// Verb as passed to `systemctl` and init scripts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Disable => "disable",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle call and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleCall {
    /// Unit or service name
    pub unit: String,
    /// Verb issued
    pub verb: Verb,
    /// Failure reason, `None` on success
    pub error: Option<String>,
}

/// Results of a batch of lifecycle calls, in issue order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Every call issued
    pub calls: Vec<LifecycleCall>,
}

impl LifecycleReport {
    /// Calls that failed.
    pub fn failures(&self) -> impl Iterator<Item = &LifecycleCall> {
        self.calls.iter().filter(|c| c.error.is_some())
    }

    /// Whether every call succeeded.
    pub fn is_ok(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Append another report.
    pub fn merge(&mut self, other: Self) {
        self.calls.extend(other.calls);
    }
}

/// Issues lifecycle verbs on one host for one cluster.
#[derive(Debug)]
pub struct ServiceController<'h> {
    host: &'h Host,
    cluster: String,
}

impl<'h> ServiceController<'h> {
    /// Controller for ceph daemons of `cluster`.
    ///
    /// Fails with [`Error::UnsupportedConfiguration`] for a non-default
    /// cluster on a sysvinit host, before any remote command. On systemd
    /// hosts, units for a non-default cluster are generated here.
    pub fn for_cluster(host: &'h Host, cluster: &str) -> Result<Self> {
        if host.distro.init == InitSystem::Sysvinit && cluster != DEFAULT_CLUSTER {
            return Err(Error::UnsupportedConfiguration {
                host: host.hostname().to_string(),
                message: format!(
                    "custom cluster name '{cluster}' is not supported on sysvinit hosts"
                ),
            });
        }

        systemd::build_up(host, cluster)?;
        Ok(Self {
            host,
            cluster: cluster.to_string(),
        })
    }

    /// Controller for non-ceph services only (apache, salt-minion, ...).
    pub fn plain(host: &'h Host) -> Self {
        Self {
            host,
            cluster: DEFAULT_CLUSTER.to_string(),
        }
    }

    /// Enable daemon instances.
    pub fn enable(&self, kind: DaemonKind, instances: &[&str]) -> LifecycleReport {
        self.apply(&[Verb::Enable], kind, instances)
    }

    /// Start daemon instances.
    pub fn start(&self, kind: DaemonKind, instances: &[&str]) -> LifecycleReport {
        self.apply(&[Verb::Start], kind, instances)
    }

    /// Stop daemon instances.
    pub fn stop(&self, kind: DaemonKind, instances: &[&str]) -> LifecycleReport {
        self.apply(&[Verb::Stop], kind, instances)
    }

    /// Disable daemon instances.
    pub fn disable(&self, kind: DaemonKind, instances: &[&str]) -> LifecycleReport {
        self.apply(&[Verb::Disable], kind, instances)
    }

    /// Query daemon instances.
    pub fn status(&self, kind: DaemonKind, instances: &[&str]) -> LifecycleReport {
        self.apply(&[Verb::Status], kind, instances)
    }

    /// Issue each verb in order for each instance.
    pub fn apply(&self, verbs: &[Verb], kind: DaemonKind, instances: &[&str]) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        for instance in instances {
            for verb in verbs {
                let (unit, argv) = self.daemon_command(*verb, kind, instance);
                report.calls.push(self.call(&unit, *verb, &argv));
            }
        }
        report
    }

    /// Issue verbs against a plain service, name mapped per family.
    pub fn service(&self, verbs: &[Verb], name: &str) -> LifecycleReport {
        let name = self.host.platform().service_mapping(name);
        let mut report = LifecycleReport::default();
        for verb in verbs {
            let argv = self.service_command(*verb, name);
            report.calls.push(self.call(name, *verb, &argv));
        }
        report
    }

    fn daemon_command(&self, verb: Verb, kind: DaemonKind, instance: &str) -> (String, Vec<String>) {
        match self.host.distro.init {
            InitSystem::Systemd => {
                let unit =
                    systemd::unit_name(&self.cluster, kind, &systemd::instance_id(kind, instance));
                let argv = vec!["systemctl".to_string(), verb.to_string(), unit.clone()];
                (unit, argv)
            }
            InitSystem::Sysvinit => {
                let unit = format!("{kind}.{instance}");
                let argv = match verb {
                    Verb::Enable | Verb::Disable => self.sysv_boot_command(verb, "ceph"),
                    _ => vec![
                        "/etc/init.d/ceph".to_string(),
                        "-c".to_string(),
                        format!("/etc/ceph/{}.conf", self.cluster),
                        verb.to_string(),
                        unit.clone(),
                    ],
                };
                (unit, argv)
            }
        }
    }

    fn service_command(&self, verb: Verb, name: &str) -> Vec<String> {
        match self.host.distro.init {
            InitSystem::Systemd => {
                vec!["systemctl".to_string(), verb.to_string(), name.to_string()]
            }
            InitSystem::Sysvinit => match verb {
                Verb::Enable | Verb::Disable => self.sysv_boot_command(verb, name),
                _ => vec!["service".to_string(), name.to_string(), verb.to_string()],
            },
        }
    }

    fn sysv_boot_command(&self, verb: Verb, script: &str) -> Vec<String> {
        let enable = verb == Verb::Enable;
        let argv = match (self.host.distro.package_manager, enable) {
            (PackageManager::Apt, true) => vec!["update-rc.d", script, "defaults"],
            (PackageManager::Apt, false) => vec!["update-rc.d", "-f", script, "remove"],
            (_, true) => vec!["chkconfig", script, "on"],
            (_, false) => vec!["chkconfig", script, "off"],
        };
        argv.into_iter().map(str::to_string).collect()
    }

    fn call(&self, unit: &str, verb: Verb, argv: &[String]) -> LifecycleCall {
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        let hostname = self.host.hostname();

        let error = match self.host.conn().run(&argv, Some(LIFECYCLE_TIMEOUT)) {
            Ok(out) if out.success() => None,
            Ok(out) => Some(if out.stderr.is_empty() {
                format!("exit code {}", out.code)
            } else {
                out.stderr_str()
            }),
            Err(e) => Some(e.to_string()),
        };

        match &error {
            Some(reason) => log::error!("{hostname}: failed to {verb} {unit}: {reason}"),
            None => log::debug!("{hostname}: {verb} {unit}"),
        }

        LifecycleCall {
            unit: unit.to_string(),
            verb,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_host;
    use remote::CommandOutput;
    use remote::memory::MemoryHost;

    #[test]
    fn test_custom_cluster_on_sysvinit_fails_before_any_command() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "CentOS", "6.10", "Final");

        let err = ServiceController::for_cluster(&host, "mycluster").unwrap_err();
        assert!(matches!(err, Error::UnsupportedConfiguration { .. }));
        assert!(memory.commands().is_empty());
        assert!(memory.writes().is_empty());
    }

    #[test]
    fn test_enable_twice_is_idempotent() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "CentOS Linux", "7", "Core");
        let controller = ServiceController::for_cluster(&host, "ceph").unwrap();

        let first = controller.enable(DaemonKind::Mon, &["node1"]);
        let second = controller.enable(DaemonKind::Mon, &["node1"]);
        assert!(first.is_ok());
        assert_eq!(first, second);
        assert_eq!(
            memory.commands(),
            vec!["systemctl enable ceph-mon@node1", "systemctl enable ceph-mon@node1"]
        );
    }

    #[test]
    fn test_failed_verb_does_not_stop_the_next() {
        let memory = MemoryHost::new("node1");
        memory.respond(
            &["systemctl", "enable", "ceph-mon@node1"],
            CommandOutput::failed(1, ["Failed to enable unit"]),
        );
        memory.time_out(&["systemctl", "start", "ceph-mon@node1"]);
        let host = memory_host(&memory, "CentOS Linux", "7", "Core");
        let controller = ServiceController::for_cluster(&host, "ceph").unwrap();

        let report = controller.apply(
            &[Verb::Enable, Verb::Start, Verb::Status],
            DaemonKind::Mon,
            &["node1"],
        );

        assert_eq!(report.calls.len(), 3);
        let failed: Vec<Verb> = report.failures().map(|c| c.verb).collect();
        assert_eq!(failed, vec![Verb::Enable, Verb::Start]);
        assert_eq!(report.calls[0].error.as_deref(), Some("Failed to enable unit"));
        assert!(report.calls[2].error.is_none());
    }

    #[test]
    fn test_custom_cluster_generates_units_and_names_them() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "SUSE Linux Enterprise Server", "12", "");
        let controller = ServiceController::for_cluster(&host, "mycluster").unwrap();

        assert!(memory.exists(&systemd::unit_file_path("mycluster", DaemonKind::Mon)));
        controller.start(DaemonKind::Mon, &["node1"]);
        assert_eq!(
            memory.commands().last().map(String::as_str),
            Some("systemctl start ceph-mycluster-mon@node1")
        );
    }

    #[test]
    fn test_sysvinit_daemon_commands() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "SUSE Linux Enterprise Server", "11", "");
        let controller = ServiceController::for_cluster(&host, "ceph").unwrap();

        controller.apply(&[Verb::Enable, Verb::Start], DaemonKind::Mon, &["node1"]);
        assert_eq!(
            memory.commands(),
            vec![
                "chkconfig ceph on",
                "/etc/init.d/ceph -c /etc/ceph/ceph.conf start mon.node1",
            ]
        );
    }

    #[test]
    fn test_gateway_instance_names_per_init_system() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "CentOS Linux", "7", "Core");
        ServiceController::for_cluster(&host, "ceph")
            .unwrap()
            .start(DaemonKind::Radosgw, &["gw1"]);

        let old = MemoryHost::new("node2");
        let old_host = memory_host(&old, "CentOS", "6.10", "Final");
        ServiceController::for_cluster(&old_host, "ceph")
            .unwrap()
            .start(DaemonKind::Radosgw, &["gw1"]);

        assert_eq!(memory.commands(), vec!["systemctl start ceph-radosgw@radosgw.gw1"]);
        assert_eq!(
            old.commands(),
            vec!["/etc/init.d/ceph -c /etc/ceph/ceph.conf start radosgw.gw1"]
        );
    }

    #[test]
    fn test_plain_service_is_mapped_per_family() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "Ubuntu", "14.04", "trusty");
        let controller = ServiceController::plain(&host);

        let report = controller.service(&[Verb::Enable, Verb::Stop], "apache");
        assert!(report.is_ok());
        assert_eq!(
            memory.commands(),
            vec!["update-rc.d apache2 defaults", "service apache2 stop"]
        );
    }
}
