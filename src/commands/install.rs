//! Package lifecycle: install, install-repo, uninstall, purge, purgedata.

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use hosts::{DEFAULT_CLUSTER, Error as HostError, Host, InitSystem, InstallRequest, Mirror, VersionKind};
use remote::{Connector, check};

use crate::Context;
use crate::cli::{InstallArgs, InstallRepoArgs, PurgeDataArgs};
use crate::config::Settings;
use crate::engine::{Policy, print_summary, run_on_hosts};
use crate::ui;

const DATA_DIR: &str = "/var/lib/ceph";
const CONF_DIR: &str = "/etc/ceph/";

/// How packages are sourced for an install.
#[derive(Debug)]
enum Source {
    Upstream(InstallRequest),
    Mirror(Mirror, bool),
    Custom(String),
}

/// Resolve the version flags into a version kind.
fn version_kind(args: &InstallArgs) -> VersionKind {
    if let Some(stable) = &args.stable {
        log::warn!("the --stable flag is deprecated, use --release instead");
        return VersionKind::Stable(stable.clone());
    }
    if args.testing {
        return VersionKind::Testing;
    }
    if let Some(branch) = &args.dev {
        return VersionKind::Dev(branch.clone());
    }
    VersionKind::Stable(args.release.clone())
}

fn source(args: &InstallArgs, settings: &Settings) -> Source {
    if let (Some(repo_url), Some(gpg_url)) = (&args.repo_url, &args.gpg_url) {
        return Source::Mirror(
            Mirror {
                repo_url: repo_url.clone(),
                gpg_url: gpg_url.clone(),
            },
            args.adjust_repos,
        );
    }

    let release = args.stable.as_deref().unwrap_or(&args.release);
    if let Some(name) = settings.select_repo(Some(release)) {
        return Source::Custom(name.to_string());
    }

    Source::Upstream(InstallRequest {
        version: version_kind(args),
        adjust_repos: args.adjust_repos,
    })
}

/// Refuse a custom cluster name on a sysvinit host.
fn require_cluster_support(host: &Host, cluster: &str) -> Result<()> {
    if host.distro.init == InitSystem::Sysvinit && cluster != DEFAULT_CLUSTER {
        return Err(HostError::UnsupportedConfiguration {
            host: host.hostname().to_string(),
            message: format!(
                "refusing to install with custom cluster name '{cluster}': not supported on sysvinit hosts"
            ),
        }
        .into());
    }
    Ok(())
}

fn log_ceph_version(host: &Host) {
    match host.conn().run(&["ceph", "--version"], None) {
        Ok(out) if out.success() => {
            log::info!("{}: {}", host.hostname(), out.stdout_str().trim());
        }
        Ok(out) => log::warn!("{}: ceph --version exited {}", host.hostname(), out.code),
        Err(e) => log::warn!("{}: could not check ceph version: {e}", host.hostname()),
    }
}

/// Install ceph on hosts.
pub fn install<C: Connector + ?Sized>(
    ctx: &Context,
    connector: &C,
    settings: &Settings,
    args: &InstallArgs,
) -> Result<()> {
    let targets = ctx.targets(&args.hosts)?;
    let source = source(args, settings);
    let repos = match &source {
        Source::Custom(name) => settings.repo_chain(name, true)?,
        _ => Vec::new(),
    };
    log::debug!(
        "Installing {source:?} on cluster {} hosts {}",
        ctx.cluster,
        args.hosts.join(" ")
    );

    let outcome = run_on_hosts(connector, &targets, "install ceph", Policy::AllOrFail, |host| {
        require_cluster_support(host, &ctx.cluster)?;
        log::info!("{}: installing ceph", host.hostname());

        let platform = host.platform();
        match &source {
            Source::Upstream(request) => platform.install(host, request)?,
            Source::Mirror(mirror, adjust) => platform.mirror_install(host, mirror, *adjust)?,
            Source::Custom(_) => {
                for repo in &repos {
                    log::info!("{}: adding repository {}", host.hostname(), repo.name);
                    platform.repo_install(host, repo)?;
                }
            }
        }

        hosts::systemd::build_up(host, &ctx.cluster)?;
        log_ceph_version(host);
        Ok(())
    })?;

    if !ctx.quiet {
        print_summary("Installed ceph", &outcome);
    }
    Ok(())
}

/// Add the configured custom repository without installing ceph.
pub fn install_repo<C: Connector + ?Sized>(
    ctx: &Context,
    connector: &C,
    settings: &Settings,
    args: &InstallRepoArgs,
) -> Result<()> {
    let Some(name) = settings.select_repo(args.release.as_deref()) else {
        bail!("no repository selected: define repos in the settings file or mark one as default");
    };
    let repos = settings.repo_chain(name, false)?;
    let targets = ctx.targets(&args.hosts)?;

    let outcome = run_on_hosts(connector, &targets, "add repository", Policy::AllOrFail, |host| {
        for repo in &repos {
            log::info!("{}: adding repository {}", host.hostname(), repo.name);
            host.platform().repo_install(host, repo)?;
        }
        Ok(())
    })?;

    if !ctx.quiet {
        print_summary(&format!("Added repository {name}"), &outcome);
    }
    Ok(())
}

fn remove<C: Connector + ?Sized>(ctx: &Context, connector: &C, hosts: &[String], purge: bool) -> Result<()> {
    log::info!("note that some dependencies *will not* be removed because they can cause issues with qemu-kvm");
    log::info!("like: librbd1 and librados2");

    let (action, done) = if purge {
        ("purge ceph", "Purged ceph")
    } else {
        ("uninstall ceph", "Uninstalled ceph")
    };
    log::debug!("{action} from cluster {} hosts {}", ctx.cluster, hosts.join(" "));

    let targets = ctx.targets(hosts)?;
    let outcome = run_on_hosts(connector, &targets, action, Policy::AllOrFail, |host| {
        log::info!("{}: {action}", host.hostname());
        host.platform().uninstall(host, purge)?;
        Ok(())
    })?;

    if !ctx.quiet {
        print_summary(done, &outcome);
    }
    Ok(())
}

/// Remove ceph packages.
pub fn uninstall<C: Connector + ?Sized>(ctx: &Context, connector: &C, hosts: &[String]) -> Result<()> {
    remove(ctx, connector, hosts, false)
}

/// Remove ceph packages and their configuration.
pub fn purge<C: Connector + ?Sized>(ctx: &Context, connector: &C, hosts: &[String]) -> Result<()> {
    remove(ctx, connector, hosts, true)
}

fn purge_host_data(host: &Host, cluster: &str) -> Result<()> {
    let conn = host.conn();
    let name = host.hostname();
    log::info!("{name}: purging data");

    // Mounted OSDs make this fail; handled below.
    let first = conn.run(&["rm", "-rf", "--one-file-system", "--", DATA_DIR], None)?;
    if !first.success() {
        log::debug!("{name}: first removal of {DATA_DIR} exited {}", first.code);
    }

    hosts::systemd::teardown(host, cluster)?;

    if conn.path_exists(DATA_DIR)? {
        log::warn!("{name}: OSDs may still be mounted, trying to unmount them");
        check(
            &**conn,
            &[
                "find", DATA_DIR, "-mindepth", "1", "-maxdepth", "2", "-type", "d", "-exec", "umount",
                "{}", ";",
            ],
            None,
        )?;
        check(&**conn, &["rm", "-rf", "--one-file-system", "--", DATA_DIR], None)
            .with_context(|| format!("could not remove {DATA_DIR}"))?;
    }

    check(&**conn, &["rm", "-rf", "--one-file-system", "--", CONF_DIR], None)?;
    Ok(())
}

fn confirm_purge(hosts: &[String]) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(format!(
            "Delete all ceph data on {}?",
            hosts.join(", ").bold()
        ))
        .default(false)
        .interact()?;

    Ok(confirmed)
}

/// Delete ceph data and configuration from hosts.
///
/// Refuses while ceph is still installed on any of them.
pub fn purgedata<C: Connector + ?Sized>(ctx: &Context, connector: &C, args: &PurgeDataArgs) -> Result<()> {
    log::debug!(
        "Purging data from cluster {} hosts {}",
        ctx.cluster,
        args.hosts.join(" ")
    );
    let targets = ctx.targets(&args.hosts)?;

    let checked = run_on_hosts(connector, &targets, "check for ceph", Policy::BestEffort, |host| {
        Ok(host.conn().which("ceph")?.is_some())
    })?;

    let unreachable = checked.failed_hosts();
    if !unreachable.is_empty() {
        bail!(
            "could not check {} for a ceph install: {}",
            ui::plural(unreachable.len(), "host"),
            unreachable.join(", ")
        );
    }

    let installed: Vec<&str> = checked
        .succeeded()
        .filter(|(_, installed)| **installed)
        .map(|(host, _)| host)
        .collect();
    if !installed.is_empty() {
        log::error!("ceph is still installed on: {}", installed.join(", "));
        bail!("refusing to purge data while ceph is still installed");
    }

    if !args.yes && !confirm_purge(&args.hosts)? {
        ui::warn("Aborted");
        return Ok(());
    }

    let outcome = run_on_hosts(connector, &targets, "purge data", Policy::AllOrFail, |host| {
        purge_host_data(host, &ctx.cluster)
    })?;

    if !ctx.quiet {
        print_summary("Purged data", &outcome);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{centos6_host, context, ubuntu_host};
    use remote::CommandOutput;
    use remote::memory::MemoryConnector;
    use tempfile::TempDir;

    fn install_args(hosts: &[&str]) -> InstallArgs {
        InstallArgs {
            hosts: hosts.iter().map(|h| (*h).to_string()).collect(),
            release: "firefly".to_string(),
            stable: None,
            testing: false,
            dev: None,
            adjust_repos: true,
            repo_url: None,
            gpg_url: None,
        }
    }

    #[test]
    fn test_version_kind_from_flags() {
        let mut args = install_args(&["node1"]);
        assert_eq!(version_kind(&args), VersionKind::Stable("firefly".to_string()));

        args.stable = Some("hammer".to_string());
        assert_eq!(version_kind(&args), VersionKind::Stable("hammer".to_string()));

        args.stable = None;
        args.dev = Some("wip".to_string());
        assert_eq!(version_kind(&args), VersionKind::Dev("wip".to_string()));

        args.dev = None;
        args.testing = true;
        assert_eq!(version_kind(&args), VersionKind::Testing);
    }

    #[test]
    fn test_install_writes_sources_and_checks_version() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "ceph");
        let node = ubuntu_host("node1");
        let connector = MemoryConnector::new().with_host(node.clone());

        install(&ctx, &connector, &Settings::default(), &install_args(&["node1"])).unwrap();

        assert!(node.file("/etc/apt/sources.list.d/ceph.list").unwrap().contains("debian-firefly"));
        assert!(node.commands().iter().any(|c| c == "ceph --version"));
        assert_eq!(node.open_sessions(), 0);
    }

    #[test]
    fn test_install_refuses_custom_cluster_on_sysvinit() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "backup");
        let old = centos6_host("old");
        let new = ubuntu_host("new");
        let connector = MemoryConnector::new().with_host(old.clone()).with_host(new.clone());

        let err = install(&ctx, &connector, &Settings::default(), &install_args(&["old", "new"]))
            .unwrap_err();
        assert!(err.to_string().contains("old"));

        // Nothing beyond the ceph check ran on the sysvinit host.
        assert!(old.commands().iter().all(|c| c == "uname -m"));
        // The other host was still installed, with units for the custom cluster.
        assert!(new.exists("/etc/systemd/system/ceph-backup-mon@.service"));
    }

    #[test]
    fn test_purge_uses_purge_flag() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "ceph");
        let node = ubuntu_host("node1");
        let connector = MemoryConnector::new().with_host(node.clone());

        purge(&ctx, &connector, &["node1".to_string()]).unwrap();
        assert!(node.commands().iter().any(|c| c.contains("remove --purge ceph")));
    }

    #[test]
    fn test_purgedata_refuses_while_ceph_installed() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "ceph");
        let clean = ubuntu_host("clean");
        let busy = ubuntu_host("busy");
        busy.respond(&["which", "ceph"], CommandOutput::ok(["/usr/bin/ceph"]));
        clean.add_file("/var/lib/ceph/mon/data", "x");
        let connector = MemoryConnector::new().with_host(clean.clone()).with_host(busy);

        let args = PurgeDataArgs {
            hosts: vec!["clean".to_string(), "busy".to_string()],
            yes: true,
        };
        let err = purgedata(&ctx, &connector, &args).unwrap_err();
        assert!(err.to_string().contains("still installed"));
        assert!(clean.exists("/var/lib/ceph/mon/data"));
    }

    #[test]
    fn test_purgedata_removes_data_and_config() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "ceph");
        let node = ubuntu_host("node1");
        node.add_file("/var/lib/ceph/osd/ceph-0/keyring", "k");
        node.add_file("/etc/ceph/ceph.conf", "[global]\n");
        let connector = MemoryConnector::new().with_host(node.clone());

        let args = PurgeDataArgs {
            hosts: vec!["node1".to_string()],
            yes: true,
        };
        purgedata(&ctx, &connector, &args).unwrap();

        assert!(!node.exists("/var/lib/ceph"));
        assert!(!node.exists("/etc/ceph/ceph.conf"));
        assert!(!node.commands().iter().any(|c| c.starts_with("find")));
    }

    #[test]
    fn test_purgedata_unmounts_when_first_removal_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "ceph");
        let node = ubuntu_host("node1");
        node.add_file("/var/lib/ceph/osd/ceph-0/keyring", "k");
        // Both removals hit the mounted OSD, so the host fails after unmounting.
        node.respond(
            &["rm", "-rf", "--one-file-system", "--", DATA_DIR],
            CommandOutput::failed(1, ["rm: skipping '/var/lib/ceph/osd/ceph-0', since it's on a different device"]),
        );
        let connector = MemoryConnector::new().with_host(node.clone());

        let args = PurgeDataArgs {
            hosts: vec!["node1".to_string()],
            yes: true,
        };
        let err = purgedata(&ctx, &connector, &args).unwrap_err();

        let commands = node.commands();
        assert!(commands.iter().any(|c| c.starts_with("find /var/lib/ceph")));
        assert_eq!(
            commands
                .iter()
                .filter(|c| c.as_str() == "rm -rf --one-file-system -- /var/lib/ceph")
                .count(),
            2
        );
        assert!(err.to_string().contains("purge data"));
    }
}
