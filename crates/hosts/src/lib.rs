//! # hosts
//!
//! Per-distro capabilities for deploying Ceph.
//!
//! [`get`] connects to a host, detects its distro and returns a [`Host`]:
//! the live connection bound to a [`Distro`] descriptor that fixes the init
//! system, package manager and [`Platform`] operation set for that host.
//!
//! ```no_run
//! use hosts::{ServiceController, DaemonKind};
//! use remote::{HostTarget, SshConnector};
//!
//! let host = hosts::get(&SshConnector::new(), &HostTarget::new("node1")).expect("resolve");
//! println!("{}: {} ({})", host.hostname(), host.distro, host.distro.init);
//!
//! let services = ServiceController::for_cluster(&host, "ceph").expect("controller");
//! let report = services.start(DaemonKind::Mon, &["node1"]);
//! assert!(report.is_ok());
//!
//! host.release().expect("release");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod distro;
pub mod error;
pub mod pkg;
pub mod platform;
pub mod registry;
pub mod remotes;
pub mod resolver;
pub mod service;
pub mod systemd;

pub use distro::{Distro, Family, Host, InitSystem, PackageManager, require_family};
pub use error::{Error, Result};
pub use platform::{ApacheLayout, ApacheModules, InstallRequest, Mirror, Platform, RepoSpec, VersionKind};
pub use resolver::get;
pub use service::{LifecycleCall, LifecycleReport, ServiceController, Verb};
pub use systemd::{DEFAULT_CLUSTER, DaemonKind};

#[cfg(test)]
pub(crate) mod testing {
    use crate::distro::Host;
    use crate::registry::{Identity, resolve};
    use remote::memory::{MemoryConnector, MemoryHost};
    use remote::{Connector, HostTarget};

    /// Resolve a distro without probing and bind it to a memory host.
    pub fn memory_host(memory: &MemoryHost, name: &str, release: &str, codename: &str) -> Host {
        let distro = resolve(&Identity {
            name: name.to_string(),
            id: String::new(),
            release: release.to_string(),
            codename: codename.to_string(),
            machine_type: "x86_64".to_string(),
        })
        .unwrap();
        let conn = MemoryConnector::new()
            .with_host(memory.clone())
            .open(&HostTarget::new(memory.name()))
            .unwrap();
        Host::new(distro, conn)
    }
}
