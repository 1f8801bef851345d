//! Debian and Ubuntu.

use super::{ApacheLayout, ApacheModules, InstallRequest, Mirror, Platform, RepoSpec, VersionKind};
use crate::distro::{Family, Host};
use crate::error::Result;
use remote::check;

const CEPH_PACKAGES: &[&str] = &["ceph", "ceph-mds", "radosgw"];
const REMOVE_PACKAGES: &[&str] = &["ceph", "ceph-mds", "ceph-common", "ceph-fs-common", "radosgw"];
const CEPH_LIST: &str = "/etc/apt/sources.list.d/ceph.list";

/// Debian family (also serves Ubuntu).
#[derive(Debug)]
pub struct Debian {
    family: Family,
}

/// Operation set for Debian hosts.
pub static DEBIAN: Debian = Debian {
    family: Family::Debian,
};

/// Operation set for Ubuntu hosts.
pub static UBUNTU: Debian = Debian {
    family: Family::Ubuntu,
};

fn add_key(host: &Host, key: &str) -> Result<()> {
    let script = if key.starts_with("http://") || key.starts_with("https://") {
        format!("wget -q -O- '{key}' | apt-key add -")
    } else {
        format!("apt-key add '{}'", key.trim_start_matches("file://"))
    };
    check(&**host.conn(), &["sh", "-c", &script], None)?;
    Ok(())
}

fn source_line(host: &Host, version: &VersionKind) -> String {
    let codename = host.distro.codename.to_lowercase();
    match version {
        VersionKind::Stable(release) => {
            format!("deb https://download.ceph.com/debian-{release}/ {codename} main\n")
        }
        VersionKind::Testing => {
            format!("deb https://download.ceph.com/debian-testing/ {codename} main\n")
        }
        VersionKind::Dev(branch) => format!(
            "deb http://gitbuilder.ceph.com/ceph-deb-{codename}-{}-basic/ref/{branch} {codename} main\n",
            host.distro.machine_type
        ),
    }
}

impl Platform for Debian {
    fn family(&self) -> Family {
        self.family
    }

    fn install(&self, host: &Host, request: &InstallRequest) -> Result<()> {
        if request.adjust_repos {
            let key = if request.version.is_release() {
                "https://download.ceph.com/keys/release.asc"
            } else {
                "https://download.ceph.com/keys/autobuild.asc"
            };
            add_key(host, key)?;
            host.conn()
                .write_file(CEPH_LIST, &source_line(host, &request.version))?;
        }

        host.update_packages()?;
        host.install_packages(CEPH_PACKAGES)
    }

    fn mirror_install(&self, host: &Host, mirror: &Mirror, adjust_repos: bool) -> Result<()> {
        if adjust_repos {
            add_key(host, &mirror.gpg_url)?;
            let codename = host.distro.codename.to_lowercase();
            host.conn()
                .write_file(CEPH_LIST, &format!("deb {} {codename} main\n", mirror.base()))?;
        }

        host.update_packages()?;
        host.install_packages(CEPH_PACKAGES)
    }

    fn repo_install(&self, host: &Host, repo: &RepoSpec) -> Result<()> {
        if let Some(key) = &repo.gpgkey {
            add_key(host, key)?;
        }

        let codename = host.distro.codename.to_lowercase();
        let path = format!("/etc/apt/sources.list.d/{}.list", repo.name);
        let line = format!("deb {} {codename} main\n", repo.baseurl.trim_end_matches('/'));
        host.conn().write_file(&path, &line)?;

        host.update_packages()?;
        if repo.install_ceph {
            host.install_packages(CEPH_PACKAGES)?;
        }
        Ok(())
    }

    fn uninstall(&self, host: &Host, purge: bool) -> Result<()> {
        host.remove_packages(REMOVE_PACKAGES, purge)
    }

    fn apache(&self) -> ApacheLayout {
        ApacheLayout {
            packages: &["apache2", "libapache2-mod-fastcgi"],
            conf_dir: "/etc/apache2/conf.d",
            fcgi_dir: "/var/www/radosgw",
            group: "www-data",
            modules: ApacheModules::A2enmod,
        }
    }

    fn service_mapping<'a>(&self, service: &'a str) -> &'a str {
        match service {
            "apache" => "apache2",
            other => other,
        }
    }
}
