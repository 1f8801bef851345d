use anyhow::{Context as _, Result};
use hosts::remotes::{self, ConfWrite};
use remote::{Connector, HostTarget};

use crate::Context;
use crate::config::settings_path;
use crate::engine::{Policy, print_summary, run_on_hosts};
use crate::ui;

/// Write the local cluster config to `/etc/ceph` on hosts.
pub fn push<C: Connector + ?Sized>(ctx: &Context, connector: &C, hosts: &[String]) -> Result<()> {
    let targets = ctx.targets(hosts)?;
    push_to(ctx, connector, &targets)
}

/// Push to already-parsed targets. Fails if any host could not be written.
pub fn push_to<C: Connector + ?Sized>(
    ctx: &Context,
    connector: &C,
    targets: &[HostTarget],
) -> Result<()> {
    let path = ctx.conf_path();
    let content = cephconf::load_raw(&path)
        .with_context(|| format!("Could not read {}", path.display()))?;

    let outcome = run_on_hosts(connector, targets, "push config", Policy::AllOrFail, |host| {
        log::info!("{}: pushing {}", host.hostname(), remotes::conf_path(&ctx.cluster));
        let written =
            remotes::write_conf(&**host.conn(), &ctx.cluster, &content, ctx.overwrite_conf)?;
        Ok(written)
    })?;

    if !ctx.quiet {
        let unchanged = outcome
            .succeeded()
            .filter(|(_, written)| **written == ConfWrite::Unchanged)
            .count();
        print_summary("Pushed config", &outcome);
        if unchanged > 0 {
            ui::dim(&format!("{} already up to date", ui::plural(unchanged, "host")));
        }
    }
    Ok(())
}

/// Show where settings and the cluster config come from.
pub fn show(ctx: &Context) -> Result<()> {
    ui::header("Configuration");
    ui::kv("Settings", &settings_path()?.display().to_string());
    ui::kv("Cluster", &ctx.cluster);

    let path = ctx.conf_path();
    match cephconf::load(&path) {
        Ok(config) => {
            ui::kv("Cluster config", &path.display().to_string());
            let monitors = cephconf::gateway::mon_hosts(&config);
            if !monitors.is_empty() {
                ui::kv("Monitors", &monitors.join(", "));
            }
            ui::kv("Gateways", &cephconf::gateway::gateways(&config).len().to_string());
        }
        Err(cephconf::Error::NotFound(_)) => {
            ui::kv("Cluster config", &format!("{} (not found)", path.display()));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, ubuntu_host};
    use remote::memory::MemoryConnector;
    use std::fs;
    use tempfile::TempDir;

    const CONF: &str = "[global]\nfsid = 1234\nmon_initial_members = mon1\n\n";

    #[test]
    fn test_push_writes_missing_config() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ceph.conf"), CONF).unwrap();
        let ctx = context(dir.path(), "ceph");
        let node = ubuntu_host("node1");
        let connector = MemoryConnector::new().with_host(node.clone());

        push(&ctx, &connector, &["node1".to_string()]).unwrap();
        assert_eq!(node.file("/etc/ceph/ceph.conf").as_deref(), Some(CONF));
        assert_eq!(node.open_sessions(), 0);
    }

    #[test]
    fn test_push_refuses_differing_config_without_overwrite() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ceph.conf"), CONF).unwrap();
        let mut ctx = context(dir.path(), "ceph");
        let same = ubuntu_host("same");
        same.add_file("/etc/ceph/ceph.conf", CONF);
        let edited = ubuntu_host("edited");
        edited.add_file("/etc/ceph/ceph.conf", "[global]\nfsid = 9999\n");
        let connector = MemoryConnector::new().with_host(same.clone()).with_host(edited.clone());
        let hosts = vec!["same".to_string(), "edited".to_string()];

        let err = push(&ctx, &connector, &hosts).unwrap_err();
        assert_eq!(err.to_string(), "Failed to push config 1 host (edited)");
        assert_eq!(edited.file("/etc/ceph/ceph.conf").as_deref(), Some("[global]\nfsid = 9999\n"));
        assert!(same.writes().is_empty());

        ctx.overwrite_conf = true;
        push(&ctx, &connector, &hosts).unwrap();
        assert_eq!(edited.file("/etc/ceph/ceph.conf").as_deref(), Some(CONF));
    }

    #[test]
    fn test_push_uses_cluster_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("backup.conf"), CONF).unwrap();
        let ctx = context(dir.path(), "backup");
        let node = ubuntu_host("node1");
        let connector = MemoryConnector::new().with_host(node.clone());

        push(&ctx, &connector, &["node1".to_string()]).unwrap();
        assert!(node.exists("/etc/ceph/backup.conf"));
    }

    #[test]
    fn test_push_without_local_config_fails_before_connecting() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "ceph");
        let node = ubuntu_host("node1");
        let connector = MemoryConnector::new().with_host(node.clone());

        assert!(push(&ctx, &connector, &["node1".to_string()]).is_err());
        assert_eq!(node.open_count(), 0);
    }
}
