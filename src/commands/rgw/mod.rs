//! Rados gateway commands: list, prepare, activate, create, delete.
//!
//! The local `<cluster>.conf` is the source of truth for gateway sections.
//! Prepare and delete change it, save it and push it to the monitors and
//! every gateway host.

mod apache;
mod auth;
mod spec;

use anyhow::{Context as _, Result, bail};
use cephconf::gateway::{self, GatewayPaths};
use cephconf::{ClusterConfig, SaveMode};
use colored::Colorize;
use hosts::{DaemonKind, Host, LifecycleReport, ServiceController, Verb};
use remote::{Connector, Session};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::Context;
use crate::engine::{Policy, run_on_hosts};
use crate::ui;
use auth::AuthEntry;
use spec::GatewaySpec;

/// Scratch directory on the monitor for generated keys.
const KEY_TMP_DIR: &str = "/var/lib/ceph/tmp";

/// Gateways that could not be handled, with the reason.
#[derive(Debug, Default)]
struct Failures(Vec<(String, String)>);

impl Failures {
    fn record(&mut self, gateway: &str, reason: impl Into<String>) {
        let reason = reason.into();
        log::error!("{gateway}: {reason}");
        self.0.push((gateway.to_string(), reason));
    }

    fn check(self, action: &str) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = self.0.iter().map(|(g, _)| g.as_str()).collect();
        bail!(
            "Failed to {action} {} ({})",
            ui::plural(names.len(), "gateway"),
            names.join(", ")
        )
    }
}

/// A gateway whose section is reconciled and ready to be set up.
#[derive(Debug)]
struct Planned {
    spec: GatewaySpec,
    keyring: String,
    socket: String,
    log_file: String,
}

fn load_config(ctx: &Context) -> Result<ClusterConfig> {
    let path = ctx.conf_path();
    cephconf::load(&path).with_context(|| format!("Could not load {}", path.display()))
}

fn monitors(config: &ClusterConfig, ctx: &Context) -> Result<Vec<String>> {
    let mons = gateway::mon_hosts(config);
    if mons.is_empty() {
        bail!(
            "no monitors in {}: set mon_initial_members",
            ctx.conf_path().display()
        );
    }
    Ok(mons)
}

/// Run `op` against the first monitor that can be reached.
///
/// Monitors that cannot be resolved or connected to are skipped. Once one is
/// reached, its result is final.
fn on_mon<C, T, F>(ctx: &Context, connector: &C, mons: &[String], action: &str, mut op: F) -> Result<T>
where
    C: Connector + ?Sized,
    F: FnMut(&Host) -> Result<T>,
{
    for target in ctx.targets(mons)? {
        let host = match hosts::get(connector, &target) {
            Ok(host) => host,
            Err(e) => {
                log::warn!("{}: skipping monitor: {e}", target.host);
                continue;
            }
        };
        let result = op(&host);
        if let Err(e) = host.release() {
            log::warn!("{}: failed to release connection: {e}", target.host);
        }
        return result.with_context(|| format!("{}: failed to {action}", target.host));
    }
    bail!("no monitor reachable to {action} (tried {})", mons.join(", "))
}

fn local_keyring(ctx: &Context, entity: &str) -> PathBuf {
    ctx.conf_dir.join(format!("{}.{entity}.keyring", ctx.cluster))
}

fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/')
        .map(|(dir, _)| dir)
        .filter(|dir| !dir.is_empty())
}

/// Print gateways recorded in the cluster config.
pub fn list(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let gateways = gateway::gateways(&config);
    if gateways.is_empty() {
        ui::info("No gateways configured");
        return Ok(());
    }

    for gw in &gateways {
        let host = gw.host.as_deref().unwrap_or("?");
        println!("{}:{}", host, gw.name().bold());
        if ctx.verbose > 0 {
            if let Some(socket) = &gw.socket {
                ui::kv("socket", socket);
            }
            if let Some(keyring) = &gw.keyring {
                ui::kv("keyring", keyring);
            }
        }
    }
    Ok(())
}

/// Make sure pools exist and every entity has a key. Returns all keys.
fn cluster_keys(host: &Host, cluster: &str, entities: &[&str]) -> Result<BTreeMap<String, AuthEntry>> {
    let session: &dyn Session = &**host.conn();
    let created = auth::ensure_pools(session)?;
    if !created.is_empty() {
        log::info!("{}: created pools {}", host.hostname(), created.join(" "));
    }

    let mut keys = auth::list_keys(session)?;
    let missing: Vec<&str> = entities
        .iter()
        .copied()
        .filter(|entity| !keys.contains_key(*entity))
        .collect();
    if missing.is_empty() {
        return Ok(keys);
    }

    session.makedir(KEY_TMP_DIR)?;
    for entity in missing {
        let keypath = format!("{KEY_TMP_DIR}/{cluster}.{entity}.keyring");
        let generated = auth::generate_key(session, &keypath, entity);
        if session.path_exists(&keypath)? {
            session.unlink(&keypath)?;
        }
        // Reported per gateway once the key turns out to be absent.
        if let Err(e) = generated {
            log::error!("{}: {e:#}", host.hostname());
        }
    }
    keys = auth::list_keys(session)?;
    Ok(keys)
}

fn setup_gateway(host: &Host, cluster: &str, gw: &Planned, key: &AuthEntry) -> Result<()> {
    let layout = host.platform().apache();
    let mut packages = vec!["ceph-radosgw"];
    packages.extend_from_slice(layout.packages);
    host.install_packages(&packages)?;

    let session: &dyn Session = &**host.conn();
    for path in [&gw.socket, &gw.log_file] {
        if let Some(dir) = parent(path) {
            session.makedir(dir)?;
        }
    }

    log::info!("{}: writing keyring {}", host.hostname(), gw.keyring);
    hosts::remotes::write_keyring(
        session,
        &gw.keyring,
        &key.to_keyring(),
        0o640,
        ("root", layout.group),
    )?;

    apache::setup(
        host,
        &apache::Vhost {
            cluster,
            entity: &gw.spec.entity,
            socket: &gw.socket,
            fqdn: gw.spec.fqdn.as_deref(),
            port: gw.spec.port,
            redirect: &gw.spec.redirect,
        },
    )
}

fn write_local_keyring(path: &Path, key: &AuthEntry) -> Result<()> {
    if path.exists() {
        log::debug!("{} exists, keeping it", path.display());
        return Ok(());
    }
    fs::write(path, key.to_keyring())
        .with_context(|| format!("Could not write {}", path.display()))
}

/// Save the config if it changed, then push it to monitors and gateway hosts.
fn save_and_push<C: Connector + ?Sized>(
    ctx: &Context,
    connector: &C,
    config: &ClusterConfig,
    changed: bool,
    extra_hosts: &[String],
) -> Result<()> {
    if changed {
        cephconf::save(config, &ctx.conf_path(), SaveMode::Replace)?;
    }
    let mut hosts = gateway::push_hosts(config);
    for host in extra_hosts {
        gateway::push_unique(&mut hosts, host);
    }
    let targets = ctx.targets(&hosts)?;
    crate::commands::config::push_to(ctx, connector, &targets)
}

/// Install, configure and key gateways.
pub fn prepare<C: Connector + ?Sized>(ctx: &Context, connector: &C, gateways: &[String]) -> Result<()> {
    let specs = spec::parse_all(gateways)?;
    let mut config = load_config(ctx)?;
    let mons = monitors(&config, ctx)?;
    let mut failures = Failures::default();

    // Sections first: a conflicting binding never reaches any host.
    let mut changed = false;
    let mut planned = Vec::new();
    for spec in specs {
        let paths = GatewayPaths::for_entity(&ctx.cluster, &spec.entity);
        let result = cephconf::reconcile(&mut config, &spec.entity, &paths.desired_fields(&spec.host));
        match result {
            Ok(rec) => {
                changed |= rec.changed;
                if !rec.changed {
                    log::warn!("{}: already configured, reusing its settings", spec.entity);
                }
                let field = |key: &str, default: &str| rec.get(key).unwrap_or(default).to_string();
                planned.push(Planned {
                    keyring: field("keyring", &paths.keyring),
                    socket: field("rgw socket path", &paths.socket),
                    log_file: field("log file", &paths.log_file),
                    spec,
                });
            }
            Err(e) => failures.record(spec.instance(), e.to_string()),
        }
    }

    if planned.is_empty() {
        return failures.check("prepare");
    }

    let entities: Vec<&str> = planned.iter().map(|p| p.spec.entity.as_str()).collect();
    let keys = on_mon(ctx, connector, &mons, "set up gateway keys", |host| {
        cluster_keys(host, &ctx.cluster, &entities)
    })?;

    let mut ready = Vec::new();
    for gw in &planned {
        let name = gw.spec.instance();
        let Some(key) = keys.get(&gw.spec.entity) else {
            failures.record(name, format!("no key registered for {}", gw.spec.entity));
            continue;
        };
        if let Err(e) = write_local_keyring(&local_keyring(ctx, &gw.spec.entity), key) {
            failures.record(name, format!("{e:#}"));
            continue;
        }

        let targets = ctx.targets(&[gw.spec.host.as_str()])?;
        let outcome = run_on_hosts(connector, &targets, "prepare gateway", Policy::BestEffort, |host| {
            setup_gateway(host, &ctx.cluster, gw, key)
        })?;
        match outcome.failed().next() {
            Some((_, reason)) => failures.record(name, reason),
            None => ready.push(format!("{}:{name}", gw.spec.host)),
        }
    }

    save_and_push(ctx, connector, &config, changed, &[])?;

    if !ctx.quiet {
        for gw in &ready {
            ui::success(&format!("Prepared {gw}"));
        }
    }
    failures.check("prepare")
}

fn log_report(host: &Host, report: &LifecycleReport) {
    for call in report.failures() {
        log::warn!(
            "{}: {} {} did not succeed: {}",
            host.hostname(),
            call.verb,
            call.unit,
            call.error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn activate_gateway(host: &Host, cluster: &str, spec: &GatewaySpec) -> Result<LifecycleReport> {
    let mut report = ServiceController::plain(host).service(&[Verb::Start, Verb::Enable], "apache");
    let services = ServiceController::for_cluster(host, cluster)?;
    report.merge(services.apply(
        &[Verb::Start, Verb::Status, Verb::Enable],
        DaemonKind::Radosgw,
        &[spec.instance()],
    ));
    log_report(host, &report);
    Ok(report)
}

/// Start and enable prepared gateways.
///
/// Individual start/enable calls that fail are reported but do not fail the
/// gateway; only an unreachable host or an unsupported cluster does.
pub fn activate<C: Connector + ?Sized>(ctx: &Context, connector: &C, gateways: &[String]) -> Result<()> {
    let specs = spec::parse_all(gateways)?;
    let config = load_config(ctx)?;
    let mut failures = Failures::default();

    for spec in &specs {
        let name = spec.instance();
        match config.get(&spec.entity, "host") {
            None if !config.has_section(&spec.entity) => {
                failures.record(name, format!("{} is not prepared", spec.entity));
                continue;
            }
            Some(bound) if bound != spec.host => {
                failures.record(name, format!("{} is bound to {bound}, not {}", spec.entity, spec.host));
                continue;
            }
            _ => {}
        }

        let targets = ctx.targets(&[spec.host.as_str()])?;
        let outcome = run_on_hosts(connector, &targets, "activate gateway", Policy::BestEffort, |host| {
            activate_gateway(host, &ctx.cluster, spec)
        })?;
        if let Some((_, reason)) = outcome.failed().next() {
            failures.record(name, reason);
            continue;
        }
        if !ctx.quiet {
            for (host, report) in outcome.succeeded() {
                if report.is_ok() {
                    ui::success(&format!("Activated {host}:{name}"));
                } else {
                    ui::warn(&format!(
                        "Activated {host}:{name} with {}",
                        ui::plural(report.failures().count(), "failed call")
                    ));
                }
            }
        }
    }

    failures.check("activate")
}

/// Prepare then activate.
pub fn create<C: Connector + ?Sized>(ctx: &Context, connector: &C, gateways: &[String]) -> Result<()> {
    prepare(ctx, connector, gateways)?;
    activate(ctx, connector, gateways)
}

/// Remove one gateway from its host. Apache is stopped and disabled with the
/// host's last gateway.
fn teardown_gateway(host: &Host, cluster: &str, gw: &gateway::Gateway, last_on_host: bool) -> Result<()> {
    let name = host.hostname();
    let removed = apache::teardown(host, &gw.entity, gw.socket.as_deref())?;
    if removed.is_empty() {
        log::info!("{name}: no apache files for {}", gw.entity);
    }

    let keyring = gw
        .keyring
        .clone()
        .unwrap_or_else(|| GatewayPaths::for_entity(cluster, &gw.entity).keyring);
    let session: &dyn Session = &**host.conn();
    if session.path_exists(&keyring)? {
        log::info!("{name}: deleting {keyring}");
        session.unlink(&keyring)?;
    }

    let services = ServiceController::for_cluster(host, cluster)?;
    let mut report = services.apply(&[Verb::Stop, Verb::Disable], DaemonKind::Radosgw, &[gw.name()]);
    if last_on_host {
        report.merge(ServiceController::plain(host).service(&[Verb::Stop, Verb::Disable], "apache"));
    }
    log_report(host, &report);
    Ok(())
}

/// Tear down gateways and remove them from the cluster config.
///
/// A gateway stays in the config (and keeps its key) when its host could not
/// be cleaned, so the delete can be retried.
pub fn delete<C: Connector + ?Sized>(ctx: &Context, connector: &C, gateways: &[String]) -> Result<()> {
    let specs = spec::parse_all(gateways)?;
    let mut config = load_config(ctx)?;
    let mons = monitors(&config, ctx)?;
    let recorded = gateway::gateways(&config);
    let mut failures = Failures::default();

    let mut doomed = Vec::new();
    let mut cleaned_hosts = Vec::new();
    for spec in &specs {
        let name = spec.instance();
        let Some(gw) = recorded.iter().find(|g| g.entity == spec.entity) else {
            failures.record(name, format!("{} is not in the config", spec.entity));
            continue;
        };

        match gw.host.as_deref() {
            Some(bound) if bound != spec.host => {
                failures.record(name, format!("{} is bound to {bound}, not {}", gw.entity, spec.host));
                continue;
            }
            Some(bound) => {
                let last_on_host = !recorded.iter().any(|other| {
                    other.entity != gw.entity
                        && other.host.as_deref() == Some(bound)
                        && !doomed.contains(&other.entity.as_str())
                });
                let targets = ctx.targets(&[bound])?;
                let outcome = run_on_hosts(connector, &targets, "delete gateway", Policy::BestEffort, |host| {
                    teardown_gateway(host, &ctx.cluster, gw, last_on_host)
                })?;
                if let Some((_, reason)) = outcome.failed().next() {
                    failures.record(name, reason);
                    continue;
                }
                gateway::push_unique(&mut cleaned_hosts, bound);
            }
            None => log::warn!("{}: no host recorded, removing config and key only", gw.entity),
        }

        let keyring = local_keyring(ctx, &gw.entity);
        if keyring.exists() {
            fs::remove_file(&keyring).with_context(|| format!("Could not remove {}", keyring.display()))?;
        }
        doomed.push(gw.entity.as_str());
    }

    if !doomed.is_empty() {
        on_mon(ctx, connector, &mons, "remove gateway keys", |host| {
            let session: &dyn Session = &**host.conn();
            let keys = auth::list_keys(session)?;
            for entity in doomed.iter().filter(|e| keys.contains_key(**e)) {
                auth::deauth(session, entity)?;
            }
            Ok(())
        })?;

        for entity in &doomed {
            config.remove_section(entity);
        }
        save_and_push(ctx, connector, &config, true, &cleaned_hosts)?;

        if !ctx.quiet {
            for entity in &doomed {
                ui::success(&format!("Deleted {}", gateway::instance_name(entity)));
            }
        }
    }

    failures.check("delete")
}
