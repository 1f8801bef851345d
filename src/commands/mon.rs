//! Monitor deployment: `mon create`.
//!
//! Each host gets the cluster config, a monitor store built with
//! `ceph-mon --mkfs` from the local `<cluster>.mon.keyring`, and a running
//! `mon.<shortname>` daemon.

use anyhow::{Context as _, Result, bail};
use hosts::remotes;
use hosts::{DaemonKind, Host, InitSystem, ServiceController, Verb};
use remote::{Connector, Session, check};
use std::fs;
use std::path::PathBuf;

use crate::Context;
use crate::engine::{Policy, print_summary, run_on_hosts};

const MON_DATA_DIR: &str = "/var/lib/ceph/mon";
const TMP_DIR: &str = "/var/lib/ceph/tmp";

fn local_mon_keyring(ctx: &Context) -> PathBuf {
    ctx.conf_dir.join(format!("{}.mon.keyring", ctx.cluster))
}

/// Build the monitor store unless a previous run finished it.
fn mkfs(session: &dyn Session, cluster: &str, hostname: &str, keyring: &str, init: InitSystem) -> Result<()> {
    let data = format!("{MON_DATA_DIR}/{cluster}-{hostname}");
    let done = format!("{data}/done");
    if session.path_exists(&done)? {
        log::info!("{hostname}: monitor store in {data} already exists");
        return Ok(());
    }

    session.makedir(&data)?;
    session.makedir(TMP_DIR)?;
    let keypath = format!("{TMP_DIR}/{cluster}-{hostname}.mon.keyring");
    session.write_file(&keypath, keyring)?;

    let built = check(
        session,
        &["ceph-mon", "--cluster", cluster, "--mkfs", "-i", hostname, "--keyring", &keypath],
        None,
    );
    session.unlink(&keypath)?;
    built?;

    session.write_file(&done, "")?;
    session.write_file(&format!("{data}/{init}"), "")?;
    Ok(())
}

fn start_monitor(host: &Host, cluster: &str, hostname: &str) -> Result<()> {
    let services = ServiceController::for_cluster(host, cluster)?;
    let report = match host.distro.init {
        InitSystem::Systemd => {
            let mut report = services.apply(&[Verb::Enable, Verb::Start], DaemonKind::Mon, &[hostname]);
            report.merge(ServiceController::plain(host).service(&[Verb::Enable], "ceph.target"));
            report
        }
        InitSystem::Sysvinit => services.start(DaemonKind::Mon, &[hostname]),
    };

    if let Some(failed) = report.failures().next() {
        bail!(
            "could not {} {}: {}",
            failed.verb,
            failed.unit,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn create_host(ctx: &Context, host: &Host, conf: &str, keyring: &str) -> Result<String> {
    let session: &dyn Session = &**host.conn();
    let hostname = session.shortname()?;
    if hostname != host.hostname() {
        log::warn!(
            "{}: remote short hostname is {hostname}; the monitor will be mon.{hostname}",
            host.hostname()
        );
    }
    log::info!("{}: deploying mon.{hostname} ({})", host.hostname(), host.distro);

    remotes::write_conf(session, &ctx.cluster, conf, ctx.overwrite_conf)?;
    mkfs(session, &ctx.cluster, &hostname, keyring, host.distro.init)?;
    start_monitor(host, &ctx.cluster, &hostname)?;
    Ok(hostname)
}

/// Deploy monitors on `hosts`, or on `mon_initial_members` when none are given.
pub fn create<C: Connector + ?Sized>(ctx: &Context, connector: &C, hosts: &[String]) -> Result<()> {
    let path = ctx.conf_path();
    let conf = cephconf::load_raw(&path).with_context(|| format!("Could not read {}", path.display()))?;

    let hosts = if hosts.is_empty() {
        let config = cephconf::ClusterConfig::parse(&conf)?;
        let mons = cephconf::gateway::mon_hosts(&config);
        if mons.is_empty() {
            bail!("no hosts given and no mon_initial_members in {}", path.display());
        }
        mons
    } else {
        hosts.to_vec()
    };

    let keyring_path = local_mon_keyring(ctx);
    let keyring = fs::read_to_string(&keyring_path).with_context(|| {
        format!(
            "Could not read monitor keyring {}; create it before deploying monitors",
            keyring_path.display()
        )
    })?;

    let targets = ctx.targets(&hosts)?;
    let outcome = run_on_hosts(connector, &targets, "create monitor", Policy::AllOrFail, |host| {
        create_host(ctx, host, &conf, &keyring)
    })?;

    if !ctx.quiet {
        print_summary("Created monitors", &outcome);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{centos6_host, context, sles_host};
    use remote::CommandOutput;
    use remote::memory::{MemoryConnector, MemoryHost};
    use tempfile::TempDir;

    const CONF: &str = "[global]\nfsid = 1234\nmon_initial_members = node1\n\n";
    const KEYRING: &str = "[mon.]\n\tkey = AQMon==\n\tcaps mon = \"allow *\"\n";

    fn workdir(cluster: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(format!("{cluster}.conf")), CONF).unwrap();
        fs::write(dir.path().join(format!("{cluster}.mon.keyring")), KEYRING).unwrap();
        dir
    }

    fn named(host: MemoryHost) -> MemoryHost {
        let name = host.name();
        host.respond(&["hostname", "-s"], CommandOutput::ok([name.as_str()]));
        host
    }

    #[test]
    fn test_create_on_systemd_defaults_to_initial_members() {
        let dir = workdir("ceph");
        let node = named(sles_host("node1"));
        let connector = MemoryConnector::new().with_host(node.clone());
        let ctx = context(dir.path(), "ceph");

        create(&ctx, &connector, &[]).unwrap();

        let commands = node.commands();
        let position = |cmd: &str| commands.iter().position(|c| c == cmd);
        let mkfs = position(
            "ceph-mon --cluster ceph --mkfs -i node1 --keyring /var/lib/ceph/tmp/ceph-node1.mon.keyring",
        )
        .unwrap();
        let enable = position("systemctl enable ceph-mon@node1").unwrap();
        let start = position("systemctl start ceph-mon@node1").unwrap();
        assert!(mkfs < enable && enable < start);
        assert!(commands.contains(&"systemctl enable ceph.target".to_string()));

        assert_eq!(node.file("/etc/ceph/ceph.conf").as_deref(), Some(CONF));
        assert!(node.exists("/var/lib/ceph/mon/ceph-node1/done"));
        assert!(node.exists("/var/lib/ceph/mon/ceph-node1/systemd"));
        assert!(!node.exists("/var/lib/ceph/tmp/ceph-node1.mon.keyring"));
        assert_eq!(node.open_sessions(), 0);
    }

    #[test]
    fn test_create_on_custom_cluster_generates_units() {
        let dir = workdir("backup");
        let node = named(sles_host("node1"));
        let connector = MemoryConnector::new().with_host(node.clone());
        let ctx = context(dir.path(), "backup");

        create(&ctx, &connector, &["node1".to_string()]).unwrap();

        assert!(node.exists("/etc/systemd/system/ceph-backup-mon@.service"));
        let commands = node.commands();
        assert!(commands.contains(&"systemctl enable ceph-backup-mon@node1".to_string()));
        assert!(commands.contains(&"systemctl start ceph-backup-mon@node1".to_string()));
        assert!(node.exists("/etc/ceph/backup.conf"));
        assert!(node.exists("/var/lib/ceph/mon/backup-node1/done"));
    }

    #[test]
    fn test_create_on_sysvinit_uses_init_script() {
        let dir = workdir("ceph");
        let node = named(centos6_host("node1"));
        let connector = MemoryConnector::new().with_host(node.clone());
        let ctx = context(dir.path(), "ceph");

        create(&ctx, &connector, &["node1".to_string()]).unwrap();

        let commands = node.commands();
        assert!(commands.contains(&"/etc/init.d/ceph -c /etc/ceph/ceph.conf start mon.node1".to_string()));
        assert!(!commands.iter().any(|c| c.contains("ceph-mon@")));
        assert!(node.exists("/var/lib/ceph/mon/ceph-node1/sysvinit"));
    }

    #[test]
    fn test_rerun_keeps_existing_store() {
        let dir = workdir("ceph");
        let node = named(sles_host("node1"));
        node.add_file("/var/lib/ceph/mon/ceph-node1/done", "");
        let connector = MemoryConnector::new().with_host(node.clone());
        let ctx = context(dir.path(), "ceph");

        create(&ctx, &connector, &["node1".to_string()]).unwrap();

        assert!(!node.commands().iter().any(|c| c.starts_with("ceph-mon")));
        assert!(node.commands().contains(&"systemctl start ceph-mon@node1".to_string()));
    }

    #[test]
    fn test_failed_mkfs_removes_keyring_and_fails() {
        let dir = workdir("ceph");
        let node = named(sles_host("node1"));
        node.respond(&["ceph-mon"], CommandOutput::failed(1, ["store exists"]));
        let connector = MemoryConnector::new().with_host(node.clone());
        let ctx = context(dir.path(), "ceph");

        let err = create(&ctx, &connector, &["node1".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "Failed to create monitor 1 host (node1)");
        assert!(!node.exists("/var/lib/ceph/tmp/ceph-node1.mon.keyring"));
        assert!(!node.exists("/var/lib/ceph/mon/ceph-node1/done"));
        assert!(!node.commands().iter().any(|c| c.starts_with("systemctl")));
    }

    #[test]
    fn test_missing_monitor_keyring_fails_before_connecting() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ceph.conf"), CONF).unwrap();
        let node = named(sles_host("node1"));
        let connector = MemoryConnector::new().with_host(node.clone());
        let ctx = context(dir.path(), "ceph");

        let err = create(&ctx, &connector, &[]).unwrap_err();
        assert!(err.to_string().contains("ceph.mon.keyring"));
        assert_eq!(node.open_count(), 0);
    }
}
