//! The capability descriptor of a resolved host.

use crate::error::{Error, Result};
use crate::pkg;
use crate::platform::Platform;
use remote::Connection;
use std::fmt;

/// OS family. Every distro the registry knows belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Debian
    Debian,
    /// Ubuntu
    Ubuntu,
    /// CentOS and its rebuilds (RHEL, Scientific, Rocky, Alma)
    Centos,
    /// Fedora
    Fedora,
    /// SUSE Linux Enterprise and openSUSE
    Suse,
}

impl Family {
    /// Normalised family name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debian => "debian",
            Self::Ubuntu => "ubuntu",
            Self::Centos => "centos",
            Self::Fedora => "fedora",
            Self::Suse => "suse",
        }
    }

    /// Map a distro name or os-release `ID` to its family.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }

        if lower.starts_with("redhat")
            || lower.starts_with("red hat")
            || lower == "rhel"
            || lower.starts_with("scientific")
            || lower.starts_with("rocky")
            || lower.starts_with("alma")
            || lower.starts_with("centos")
        {
            return Some(Self::Centos);
        }
        if lower.contains("suse") || lower.starts_with("sles") || lower.starts_with("sled") {
            return Some(Self::Suse);
        }
        if lower.starts_with("debian") {
            return Some(Self::Debian);
        }
        if lower.starts_with("ubuntu") {
            return Some(Self::Ubuntu);
        }
        if lower.starts_with("fedora") {
            return Some(Self::Fedora);
        }
        None
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Init system used to control daemons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitSystem {
    /// systemd units
    Systemd,
    /// `/etc/init.d` scripts
    Sysvinit,
}

impl fmt::Display for InitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Systemd => "systemd",
            Self::Sysvinit => "sysvinit",
        })
    }
}

/// Package manager identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    /// apt-get / dpkg
    Apt,
    /// yum / rpm
    Yum,
    /// dnf / rpm
    Dnf,
    /// zypper / rpm
    Zypper,
}

impl PackageManager {
    /// Whether packages are rpm based.
    pub fn is_rpm(&self) -> bool {
        !matches!(self, Self::Apt)
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Apt => "apt",
            Self::Yum => "yum",
            Self::Dnf => "dnf",
            Self::Zypper => "zypper",
        })
    }
}

/// Resolved identity and capabilities of one host.
///
/// Built once by the resolver and never mutated. `init`, `package_manager`
/// and `repo_tag` come from the registry entry matched by
/// `(name, release, codename)`.
#[derive(Clone)]
pub struct Distro {
    /// Distro name as reported by the host
    pub name: String,
    /// Release version as reported by the host
    pub release: String,
    /// Release codename (may be empty)
    pub codename: String,
    /// Machine architecture (`uname -m`)
    pub machine_type: String,
    /// OS family
    pub family: Family,
    /// Init system
    pub init: InitSystem,
    /// Package manager
    pub package_manager: PackageManager,
    /// Repository tag used in package repository URLs (SUSE only)
    pub repo_tag: Option<&'static str>,
    pub(crate) platform: &'static dyn Platform,
}

impl Distro {
    /// Normalised family name.
    pub fn normalized_name(&self) -> &'static str {
        self.family.as_str()
    }

    /// The operation set for this distro.
    pub fn platform(&self) -> &'static dyn Platform {
        self.platform
    }

    /// Major release number, as text.
    pub fn major_release(&self) -> &str {
        self.release.split('.').next().unwrap_or(&self.release)
    }
}

impl fmt::Debug for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Distro")
            .field("name", &self.name)
            .field("release", &self.release)
            .field("codename", &self.codename)
            .field("machine_type", &self.machine_type)
            .field("family", &self.family)
            .field("init", &self.init)
            .field("package_manager", &self.package_manager)
            .field("repo_tag", &self.repo_tag)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.release, self.codename)
    }
}

/// Fail unless the distro belongs to one of `supported`.
pub fn require_family(distro: &Distro, supported: &[Family]) -> Result<()> {
    if supported.contains(&distro.family) {
        return Ok(());
    }
    Err(Error::UnsupportedPlatform {
        name: distro.name.clone(),
        codename: distro.codename.clone(),
        release: distro.release.clone(),
    })
}

/// A resolved distro bound to the live connection it was identified through.
#[derive(Debug)]
pub struct Host {
    /// Capability descriptor
    pub distro: Distro,
    conn: Connection,
}

impl Host {
    /// Bind a distro to its connection.
    pub fn new(distro: Distro, conn: Connection) -> Self {
        Self { distro, conn }
    }

    /// Hostname of the underlying session.
    pub fn hostname(&self) -> &str {
        self.conn.host()
    }

    /// The live connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// The operation set for this host's distro.
    pub fn platform(&self) -> &'static dyn Platform {
        self.distro.platform
    }

    /// Install packages with the distro's package manager.
    pub fn install_packages(&self, packages: &[&str]) -> Result<()> {
        pkg::install(&*self.conn, self.distro.package_manager, packages)
    }

    /// Remove packages with the distro's package manager.
    pub fn remove_packages(&self, packages: &[&str], purge: bool) -> Result<()> {
        pkg::remove(&*self.conn, self.distro.package_manager, packages, purge)
    }

    /// Refresh package metadata.
    pub fn update_packages(&self) -> Result<()> {
        pkg::update(&*self.conn, self.distro.package_manager)
    }

    /// Release the connection and report teardown errors.
    pub fn release(self) -> Result<()> {
        self.conn.release().map_err(Error::from)
    }
}
