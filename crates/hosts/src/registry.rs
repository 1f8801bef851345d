//! Registry of known distro variants.
//!
//! Lookup is family first, then codename, then release. Every entry fixes
//! the init system and package manager for its releases, so those never
//! depend on anything but `(name, release, codename)`.
//!
//! | Family | Releases | Init | Packages |
//! |--------|----------|------|----------|
//! | debian | 7 | sysvinit | apt |
//! | debian | 8 to 12 | systemd | apt |
//! | ubuntu | 12.04, 14.04 | sysvinit | apt |
//! | ubuntu | 16.04 to 24.04 | systemd | apt |
//! | centos | 6 | sysvinit | yum |
//! | centos | 7 | systemd | yum |
//! | centos | 8, 9 | systemd | dnf |
//! | fedora | 20, 21 | systemd | yum |
//! | fedora | 22 to 40 | systemd | dnf |
//! | suse | 11 | sysvinit | zypper |
//! | suse | 12, 15, Mantis | systemd | zypper |
//!
//! A SUSE release that matches nothing falls back to the SLE 12 entry with
//! a warning; any other miss is [`Error::UnsupportedPlatform`].

use crate::distro::{Distro, Family, InitSystem, PackageManager};
use crate::error::{Error, Result};
use crate::platform::{Platform, debian, rpm, suse};

#[derive(Debug, Clone, Copy)]
enum Releases {
    List(&'static [&'static str]),
    Range(u32, u32),
    Codename(&'static str),
}

struct Variant {
    family: Family,
    releases: Releases,
    init: InitSystem,
    package_manager: PackageManager,
    repo_tag: Option<&'static str>,
}

const fn variant(
    family: Family,
    releases: Releases,
    init: InitSystem,
    package_manager: PackageManager,
) -> Variant {
    Variant {
        family,
        releases,
        init,
        package_manager,
        repo_tag: None,
    }
}

const fn suse_variant(releases: Releases, init: InitSystem, repo_tag: &'static str) -> Variant {
    Variant {
        family: Family::Suse,
        releases,
        init,
        package_manager: PackageManager::Zypper,
        repo_tag: Some(repo_tag),
    }
}

use InitSystem::{Systemd, Sysvinit};
use PackageManager::{Apt, Dnf, Yum};
use Releases::{Codename, List, Range};

static REGISTRY: &[Variant] = &[
    variant(Family::Debian, List(&["7"]), Sysvinit, Apt),
    variant(Family::Debian, Range(8, 12), Systemd, Apt),
    variant(Family::Ubuntu, List(&["12.04", "14.04"]), Sysvinit, Apt),
    variant(
        Family::Ubuntu,
        List(&["16.04", "18.04", "20.04", "22.04", "24.04"]),
        Systemd,
        Apt,
    ),
    variant(Family::Centos, List(&["6"]), Sysvinit, Yum),
    variant(Family::Centos, List(&["7"]), Systemd, Yum),
    variant(Family::Centos, Range(8, 9), Systemd, Dnf),
    variant(Family::Fedora, Range(20, 21), Systemd, Yum),
    variant(Family::Fedora, Range(22, 40), Systemd, Dnf),
    suse_variant(Codename("Mantis"), Systemd, "openSUSE_12.2"),
    suse_variant(List(&["11"]), Sysvinit, "SLE_11_SP3"),
    suse_variant(List(&["12"]), Systemd, "SLE_12"),
    suse_variant(List(&["15"]), Systemd, "SLE_15"),
];

/// The entry used for SUSE releases not in the table.
const SUSE_FALLBACK_RELEASE: &str = "12";

/// Release key for table lookups: `major.minor` on Ubuntu, major elsewhere.
fn release_key(family: Family, release: &str) -> String {
    let mut parts = release.trim().split('.');
    let major = parts.next().unwrap_or_default();
    match family {
        Family::Ubuntu => match parts.next() {
            Some(minor) => format!("{major}.{minor}"),
            None => major.to_string(),
        },
        _ => major.to_string(),
    }
}

impl Variant {
    fn matches(&self, key: &str, codename: &str) -> bool {
        match self.releases {
            List(releases) => releases.contains(&key),
            Range(low, high) => key.parse::<u32>().is_ok_and(|n| (low..=high).contains(&n)),
            Codename(name) => name.eq_ignore_ascii_case(codename),
        }
    }

    fn is_codename(&self) -> bool {
        matches!(self.releases, Codename(_))
    }
}

fn platform_for(family: Family) -> &'static dyn Platform {
    match family {
        Family::Debian => &debian::DEBIAN,
        Family::Ubuntu => &debian::UBUNTU,
        Family::Centos => &rpm::CENTOS,
        Family::Fedora => &rpm::FEDORA,
        Family::Suse => &suse::SUSE,
    }
}

fn find(family: Family, key: &str, codename: &str) -> Option<&'static Variant> {
    let candidates = || REGISTRY.iter().filter(move |v| v.family == family);
    candidates()
        .find(|v| v.is_codename() && v.matches(key, codename))
        .or_else(|| candidates().find(|v| !v.is_codename() && v.matches(key, codename)))
}

/// Identity reported by a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Distro name (`NAME` or `lsb_release -i`)
    pub name: String,
    /// Family hint (`ID` from os-release), may be empty
    pub id: String,
    /// Release version
    pub release: String,
    /// Release codename, may be empty
    pub codename: String,
    /// Machine architecture
    pub machine_type: String,
}

/// Resolve an identity to a capability descriptor.
pub fn resolve(identity: &Identity) -> Result<Distro> {
    let unsupported = || Error::UnsupportedPlatform {
        name: identity.name.clone(),
        codename: identity.codename.clone(),
        release: identity.release.clone(),
    };

    let family = Family::from_name(&identity.id)
        .or_else(|| Family::from_name(&identity.name))
        .ok_or_else(unsupported)?;

    let key = release_key(family, &identity.release);
    let entry = match find(family, &key, &identity.codename) {
        Some(entry) => entry,
        None if family == Family::Suse => {
            log::warn!(
                "Untested version of {}: assuming compatible with SUSE Linux Enterprise Server {SUSE_FALLBACK_RELEASE}",
                identity.name
            );
            find(family, SUSE_FALLBACK_RELEASE, "").ok_or_else(unsupported)?
        }
        None => return Err(unsupported()),
    };

    Ok(Distro {
        name: identity.name.clone(),
        release: identity.release.clone(),
        codename: identity.codename.clone(),
        machine_type: identity.machine_type.clone(),
        family,
        init: entry.init,
        package_manager: entry.package_manager,
        repo_tag: entry.repo_tag,
        platform: platform_for(family),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distro::require_family;

    fn identity(name: &str, release: &str, codename: &str) -> Identity {
        Identity {
            name: name.to_string(),
            id: String::new(),
            release: release.to_string(),
            codename: codename.to_string(),
            machine_type: "x86_64".to_string(),
        }
    }

    #[test]
    fn test_every_known_triple_resolves_to_its_entry() {
        let cases = [
            ("debian", "7.11", "wheezy", Sysvinit, Apt),
            ("debian", "8", "jessie", Systemd, Apt),
            ("debian", "12", "bookworm", Systemd, Apt),
            ("Ubuntu", "12.04", "precise", Sysvinit, Apt),
            ("Ubuntu", "14.04", "trusty", Sysvinit, Apt),
            ("Ubuntu", "16.04", "xenial", Systemd, Apt),
            ("Ubuntu", "22.04", "jammy", Systemd, Apt),
            ("CentOS", "6.10", "Final", Sysvinit, Yum),
            ("CentOS Linux", "7.9.2009", "Core", Systemd, Yum),
            ("Red Hat Enterprise Linux Server", "7.4", "Maipo", Systemd, Yum),
            ("Rocky Linux", "8.8", "Green Obsidian", Systemd, Dnf),
            ("AlmaLinux", "9.2", "Turquoise Kodkod", Systemd, Dnf),
            ("Fedora", "21", "", Systemd, Yum),
            ("Fedora", "39", "", Systemd, Dnf),
            ("SUSE Linux Enterprise Server", "11", "", Sysvinit, PackageManager::Zypper),
            ("SUSE Linux Enterprise Server", "12", "", Systemd, PackageManager::Zypper),
            ("SUSE Linux Enterprise Server", "15.4", "", Systemd, PackageManager::Zypper),
        ];

        for (name, release, codename, init, manager) in cases {
            let distro = resolve(&identity(name, release, codename))
                .unwrap_or_else(|e| panic!("{name} {release}: {e}"));
            assert_eq!(distro.init, init, "{name} {release}");
            assert_eq!(distro.package_manager, manager, "{name} {release}");
        }
    }

    #[test]
    fn test_suse_repo_tags() {
        let tag = |name: &str, release: &str, codename: &str| {
            resolve(&identity(name, release, codename)).unwrap().repo_tag
        };
        assert_eq!(tag("SUSE Linux Enterprise Server", "11", ""), Some("SLE_11_SP3"));
        assert_eq!(tag("SUSE Linux Enterprise Server", "12", ""), Some("SLE_12"));
        assert_eq!(tag("openSUSE", "12.2", "Mantis"), Some("openSUSE_12.2"));
    }

    #[test]
    fn test_suse_unknown_release_falls_back_to_sle12() {
        let distro = resolve(&identity("openSUSE Leap", "42.3", "")).unwrap();
        assert_eq!(distro.family, Family::Suse);
        assert_eq!(distro.init, Systemd);
        assert_eq!(distro.repo_tag, Some("SLE_12"));
    }

    #[test]
    fn test_unknown_combinations_are_unsupported() {
        let cases = [
            ("Arch Linux", "rolling", ""),
            ("Ubuntu", "10.04", "lucid"),
            ("debian", "6", "squeeze"),
            ("CentOS", "5.11", "Final"),
            ("Fedora", "19", "Schrödinger's Cat"),
            ("Gentoo", "2.14", ""),
        ];
        for (name, release, codename) in cases {
            let err = resolve(&identity(name, release, codename)).unwrap_err();
            assert!(
                matches!(err, Error::UnsupportedPlatform { .. }),
                "{name} {release}: {err}"
            );
        }
    }

    #[test]
    fn test_os_release_id_takes_precedence() {
        let mut ident = identity("Some Custom Spin", "9.1", "");
        ident.id = "rocky".to_string();
        let distro = resolve(&ident).unwrap();
        assert_eq!(distro.family, Family::Centos);
        assert_eq!(distro.normalized_name(), "centos");
    }

    #[test]
    fn test_resolved_platform_matches_family() {
        for (name, release) in [("Ubuntu", "20.04"), ("Fedora", "30"), ("SLES", "15")] {
            let distro = resolve(&identity(name, release, "")).unwrap();
            assert_eq!(distro.platform().family(), distro.family);
        }
    }

    #[test]
    fn test_require_family() {
        let suse = resolve(&identity("SUSE Linux Enterprise Server", "12", "")).unwrap();
        let ubuntu = resolve(&identity("Ubuntu", "16.04", "xenial")).unwrap();

        assert!(require_family(&suse, &[Family::Suse]).is_ok());
        assert!(matches!(
            require_family(&ubuntu, &[Family::Suse]),
            Err(Error::UnsupportedPlatform { .. })
        ));
    }
}
