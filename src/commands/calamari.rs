//! Connect hosts to a Calamari server through a salt minion.
//!
//! The hosts must already have access to a repository carrying
//! `salt-minion`; no repository is configured here.

use anyhow::{Result, bail};
use hosts::{Family, Host, ServiceController, Verb};
use remote::Connector;

use crate::Context;
use crate::engine::{Policy, print_summary, run_on_hosts};

const MINION_CONF_DIR: &str = "/etc/salt/minion.d";
const MINION_PACKAGE: &str = "salt-minion";

/// Families the minion setup supports.
const SUPPORTED: &[Family] = &[Family::Suse];

fn connect_host(host: &Host, master: &str) -> Result<()> {
    hosts::require_family(&host.distro, SUPPORTED)?;
    let name = host.hostname();
    log::info!("{name}: distro info: {}", host.distro);

    // The config goes in first so the minion finds its master on first start.
    let conf = format!("{MINION_CONF_DIR}/calamari.conf");
    log::debug!("{name}: creating the calamari salt config: {conf}");
    host.conn().makedir(MINION_CONF_DIR)?;
    host.conn().write_file(&conf, &format!("master: {master}\n"))?;

    log::info!("{name}: installing {MINION_PACKAGE}");
    host.install_packages(&[MINION_PACKAGE])?;

    let report = ServiceController::plain(host).service(&[Verb::Enable, Verb::Start], MINION_PACKAGE);
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

/// Point the salt minion on each host at `master`.
pub fn connect<C: Connector + ?Sized>(
    ctx: &Context,
    connector: &C,
    master: &str,
    hosts: &[String],
) -> Result<()> {
    let targets = ctx.targets(hosts)?;
    let outcome = run_on_hosts(connector, &targets, "connect to calamari", Policy::AllOrFail, |host| {
        connect_host(host, master)
    })?;

    if !ctx.quiet {
        print_summary(&format!("Connected to {master}"), &outcome);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, sles_host, ubuntu_host};
    use remote::CommandOutput;
    use remote::memory::MemoryConnector;
    use tempfile::TempDir;

    #[test]
    fn test_connect_configures_minion_on_suse() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "ceph");
        let node = sles_host("node1");
        let connector = MemoryConnector::new().with_host(node.clone());

        connect(&ctx, &connector, "calamari.example.com", &["node1".to_string()]).unwrap();

        assert_eq!(
            node.file("/etc/salt/minion.d/calamari.conf").as_deref(),
            Some("master: calamari.example.com\n")
        );
        let commands = node.commands();
        let install = commands.iter().position(|c| c.contains("install") && c.ends_with("salt-minion"));
        let enable = commands.iter().position(|c| c == "systemctl enable salt-minion");
        let start = commands.iter().position(|c| c == "systemctl start salt-minion");
        assert!(install.is_some());
        assert!(install < enable && enable < start);
    }

    #[test]
    fn test_connect_refuses_non_suse_hosts() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "ceph");
        let suse = sles_host("suse");
        let ubuntu = ubuntu_host("ubuntu");
        let connector = MemoryConnector::new().with_host(ubuntu.clone()).with_host(suse.clone());

        let err = connect(
            &ctx,
            &connector,
            "calamari.example.com",
            &["ubuntu".to_string(), "suse".to_string()],
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "Failed to connect to calamari 1 host (ubuntu)");
        assert!(!ubuntu.exists("/etc/salt/minion.d/calamari.conf"));
        assert!(suse.exists("/etc/salt/minion.d/calamari.conf"));
    }

    #[test]
    fn test_connect_fails_host_when_minion_does_not_start() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "ceph");
        let node = sles_host("node1");
        node.respond(
            &["systemctl", "start", "salt-minion"],
            CommandOutput::failed(1, ["Job for salt-minion.service failed"]),
        );
        let connector = MemoryConnector::new().with_host(node);

        let err = connect(&ctx, &connector, "calamari", &["node1".to_string()]).unwrap_err();
        assert!(err.to_string().contains("node1"));
    }
}
