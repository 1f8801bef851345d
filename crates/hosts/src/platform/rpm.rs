//! CentOS (and its rebuilds) and Fedora.
//!
//! Both families share repository files under `/etc/yum.repos.d` and
//! differ only in their dist tag and package manager.

use super::{ApacheLayout, ApacheModules, InstallRequest, Mirror, Platform, RepoSpec, VersionKind};
use crate::distro::{Family, Host};
use crate::error::Result;
use remote::check;

const CEPH_PACKAGES: &[&str] = &["ceph", "ceph-radosgw"];
const REMOVE_PACKAGES: &[&str] = &["ceph", "ceph-common", "ceph-mds", "ceph-radosgw"];
const CEPH_REPO: &str = "/etc/yum.repos.d/ceph.repo";

/// rpm-based family other than SUSE.
#[derive(Debug)]
pub struct Rpm {
    family: Family,
}

/// Operation set for CentOS, RHEL, Scientific, Rocky and Alma hosts.
pub static CENTOS: Rpm = Rpm {
    family: Family::Centos,
};

/// Operation set for Fedora hosts.
pub static FEDORA: Rpm = Rpm {
    family: Family::Fedora,
};

impl Rpm {
    /// Dist tag: `el7`, `fc22`, ...
    fn dist(&self, host: &Host) -> String {
        let prefix = match self.family {
            Family::Fedora => "fc",
            _ => "el",
        };
        format!("{prefix}{}", host.distro.major_release())
    }

    fn upstream_repos(&self, host: &Host, version: &VersionKind) -> String {
        let dist = self.dist(host);
        let base = match version {
            VersionKind::Stable(release) => format!("https://download.ceph.com/rpm-{release}/{dist}"),
            VersionKind::Testing => format!("https://download.ceph.com/rpm-testing/{dist}"),
            VersionKind::Dev(branch) => {
                let flavor = match self.family {
                    Family::Fedora => "fedora",
                    _ => "centos",
                };
                format!(
                    "http://gitbuilder.ceph.com/ceph-rpm-{flavor}{}-{}-basic/ref/{branch}",
                    host.distro.major_release(),
                    host.distro.machine_type
                )
            }
        };
        let key = release_key(version);

        let mut main = RepoSpec::new("ceph", format!("{base}/$basearch"));
        main.display_name = Some("Ceph packages for $basearch".to_string());
        main.gpgkey = Some(key.to_string());

        let mut noarch = RepoSpec::new("ceph-noarch", format!("{base}/noarch"));
        noarch.display_name = Some("Ceph noarch packages".to_string());
        noarch.gpgkey = Some(key.to_string());

        format!("{}\n{}", main.to_rpm_repo("rpm-md"), noarch.to_rpm_repo("rpm-md"))
    }
}

fn release_key(version: &VersionKind) -> &'static str {
    if version.is_release() {
        "https://download.ceph.com/keys/release.asc"
    } else {
        "https://download.ceph.com/keys/autobuild.asc"
    }
}

fn import_key(host: &Host, key: &str) -> Result<()> {
    check(&**host.conn(), &["rpm", "--import", key], None)?;
    Ok(())
}

impl Platform for Rpm {
    fn family(&self) -> Family {
        self.family
    }

    fn install(&self, host: &Host, request: &InstallRequest) -> Result<()> {
        if request.adjust_repos {
            import_key(host, release_key(&request.version))?;
            host.conn()
                .write_file(CEPH_REPO, &self.upstream_repos(host, &request.version))?;
        }

        host.install_packages(CEPH_PACKAGES)
    }

    fn mirror_install(&self, host: &Host, mirror: &Mirror, adjust_repos: bool) -> Result<()> {
        if adjust_repos {
            import_key(host, mirror.gpg_path())?;

            let mut repo = RepoSpec::new("ceph", mirror.base());
            repo.display_name = Some("Ceph mirrored packages".to_string());
            repo.gpgkey = Some(mirror.gpg_url.clone());
            host.conn().write_file(CEPH_REPO, &repo.to_rpm_repo("rpm-md"))?;
            host.update_packages()?;
        }

        host.install_packages(CEPH_PACKAGES)
    }

    fn repo_install(&self, host: &Host, repo: &RepoSpec) -> Result<()> {
        if let Some(key) = &repo.gpgkey {
            import_key(host, key)?;
        }

        let path = format!("/etc/yum.repos.d/{}.repo", repo.name);
        host.conn().write_file(&path, &repo.to_rpm_repo("rpm-md"))?;

        if repo.install_ceph {
            host.install_packages(CEPH_PACKAGES)?;
        }
        Ok(())
    }

    fn uninstall(&self, host: &Host, _purge: bool) -> Result<()> {
        host.remove_packages(REMOVE_PACKAGES, false)
    }

    fn apache(&self) -> ApacheLayout {
        ApacheLayout {
            packages: &["httpd", "mod_fastcgi"],
            conf_dir: "/etc/httpd/conf.d",
            fcgi_dir: "/var/www/radosgw",
            group: "apache",
            modules: ApacheModules::Builtin,
        }
    }

    fn service_mapping<'a>(&self, service: &'a str) -> &'a str {
        match service {
            "apache" => "httpd",
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::platform::{InstallRequest, Mirror, RepoSpec, VersionKind};
    use crate::testing::memory_host;
    use remote::memory::MemoryHost;

    #[test]
    fn test_centos7_install_writes_el7_repo() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "CentOS Linux", "7.9.2009", "Core");

        let request = InstallRequest {
            version: VersionKind::Stable("hammer".to_string()),
            adjust_repos: true,
        };
        host.platform().install(&host, &request).unwrap();

        let repo = memory.file("/etc/yum.repos.d/ceph.repo").unwrap();
        assert!(repo.contains("baseurl=https://download.ceph.com/rpm-hammer/el7/$basearch"));
        assert!(repo.contains("[ceph-noarch]"));

        let commands = memory.commands();
        assert!(commands.contains(&"rpm --import https://download.ceph.com/keys/release.asc".to_string()));
        assert!(commands.contains(&"yum -y install ceph ceph-radosgw".to_string()));
    }

    #[test]
    fn test_install_without_adjust_repos_leaves_repos_alone() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "Fedora", "38", "");

        let request = InstallRequest {
            version: VersionKind::Testing,
            adjust_repos: false,
        };
        host.platform().install(&host, &request).unwrap();

        assert!(memory.writes().is_empty());
        assert!(memory.commands().contains(&"dnf -y install ceph ceph-radosgw".to_string()));
    }

    #[test]
    fn test_mirror_install_imports_local_key() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "Rocky Linux", "9.3", "");

        let mirror = Mirror {
            repo_url: "http://mirror.local/ceph/".to_string(),
            gpg_url: "file:///root/release.asc".to_string(),
        };
        host.platform().mirror_install(&host, &mirror, true).unwrap();

        assert!(memory.commands().contains(&"rpm --import /root/release.asc".to_string()));
        let repo = memory.file("/etc/yum.repos.d/ceph.repo").unwrap();
        assert!(repo.contains("baseurl=http://mirror.local/ceph\n"));
    }

    #[test]
    fn test_repo_install_skips_ceph_unless_asked() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "CentOS Linux", "7", "Core");

        let repo = RepoSpec::new("extras", "http://repo.local/extras");
        host.platform().repo_install(&host, &repo).unwrap();

        assert!(memory.exists("/etc/yum.repos.d/extras.repo"));
        assert!(!memory.commands().iter().any(|c| c.contains("install")));
    }

    #[test]
    fn test_apache_maps_to_httpd() {
        let memory = MemoryHost::new("node1");
        let host = memory_host(&memory, "CentOS Linux", "7", "Core");
        assert_eq!(host.platform().service_mapping("apache"), "httpd");
        assert_eq!(host.platform().service_mapping("ceph-radosgw"), "ceph-radosgw");
    }
}
