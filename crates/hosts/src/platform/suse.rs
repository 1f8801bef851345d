//! SUSE Linux Enterprise and openSUSE.

use super::{ApacheLayout, ApacheModules, InstallRequest, Mirror, Platform, RepoSpec};
use crate::distro::{Family, Host};
use crate::error::Result;
use remote::check;

const CEPH_PACKAGES: &[&str] = &["ceph"];
const REMOVE_PACKAGES: &[&str] = &["ceph", "ceph-common", "libcephfs1", "librados2", "librbd1", "ceph-radosgw"];

/// SUSE family.
#[derive(Debug)]
pub struct Suse;

/// Operation set for SUSE hosts.
pub static SUSE: Suse = Suse;

/// Storage staging repository for a SUSE repository tag.
fn staging_repo_url(tag: &str) -> String {
    // SLE 11 cannot fetch this repository over https.
    let protocol = if tag == "SLE_11_SP3" { "http" } else { "https" };
    format!(
        "{protocol}://download.suse.de/ibs/Devel:/Storage:/0.5:/Staging/{tag}/Devel:Storage:0.5:Staging.repo"
    )
}

fn refresh(host: &Host) -> Result<()> {
    check(&**host.conn(), &["zypper", "--non-interactive", "refresh"], None)?;
    Ok(())
}

/// Add the staging repository. zypper exits 4 when the alias is already
/// configured, which leaves the host as wanted.
fn add_staging_repo(host: &Host, tag: &str) -> Result<()> {
    let out = host
        .conn()
        .run(&["zypper", "ar", &staging_repo_url(tag)], None)?;
    if !out.success() {
        log::warn!(
            "{}: zypper ar exited {}, keeping the existing repository: {}",
            host.hostname(),
            out.code,
            out.stderr_str()
        );
    }
    Ok(())
}

impl Platform for Suse {
    fn family(&self) -> Family {
        Family::Suse
    }

    fn install(&self, host: &Host, request: &InstallRequest) -> Result<()> {
        let tag = host.distro.repo_tag.unwrap_or("SLE_12");
        log::debug!(
            "{}: installing {} for {tag}",
            host.hostname(),
            request.version
        );

        if request.adjust_repos {
            add_staging_repo(host, tag)?;
        }

        refresh(host)?;
        host.install_packages(CEPH_PACKAGES)
    }

    fn mirror_install(&self, host: &Host, mirror: &Mirror, adjust_repos: bool) -> Result<()> {
        if adjust_repos {
            check(&**host.conn(), &["rpm", "--import", mirror.gpg_path()], None)?;

            let mut repo = RepoSpec::new("ceph", mirror.base());
            repo.display_name = Some("Ceph mirrored packages".to_string());
            repo.gpgkey = Some(mirror.gpg_url.clone());
            host.conn()
                .write_file("/etc/zypp/repos.d/ceph.repo", &repo.to_rpm_repo("rpm-md"))?;
            check(&**host.conn(), &["zypper", "ref"], None)?;
        }

        host.install_packages(CEPH_PACKAGES)
    }

    fn repo_install(&self, host: &Host, repo: &RepoSpec) -> Result<()> {
        if let Some(key) = &repo.gpgkey {
            check(&**host.conn(), &["rpm", "--import", key], None)?;
        }

        let path = format!("/etc/zypp/repos.d/{}", repo.name);
        host.conn().write_file(&path, &repo.to_rpm_repo("repo-md"))?;

        if repo.install_ceph {
            host.install_packages(&["wget"])?;
            host.install_packages(CEPH_PACKAGES)?;
        }
        Ok(())
    }

    fn uninstall(&self, host: &Host, _purge: bool) -> Result<()> {
        host.remove_packages(REMOVE_PACKAGES, false)
    }

    fn apache(&self) -> ApacheLayout {
        ApacheLayout {
            packages: &["apache2", "apache2-mod_fastcgi"],
            conf_dir: "/etc/apache2/conf.d",
            fcgi_dir: "/srv/www/radosgw",
            group: "www",
            modules: ApacheModules::Sysconfig("/etc/sysconfig/apache2"),
        }
    }

    fn service_mapping<'a>(&self, service: &'a str) -> &'a str {
        match service {
            "apache" => "apache2",
            other => other,
        }
    }
}
