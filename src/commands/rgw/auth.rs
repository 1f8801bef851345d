//! Cluster-side gateway setup run on a monitor: keys and pools.

use anyhow::{Context as _, Result};
use remote::{Session, check};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Timeout for `ceph` CLI calls; they hang without monitor quorum.
const CEPH_TIMEOUT: Duration = Duration::from_secs(60);

/// Placement groups for each created pool.
pub const POOL_PG_NUM: u32 = 8;

/// Pools a gateway needs.
pub const REQUIRED_POOLS: &[&str] = &[
    ".rgw",
    ".rgw.control",
    ".rgw.gc",
    ".log",
    ".intent-log",
    ".usage",
    ".users",
    ".users.email",
    ".users.swift",
    ".users.uid",
];

#[derive(Debug, Deserialize)]
struct AuthDump {
    auth_dump: Vec<AuthEntry>,
}

/// One entity from `ceph auth list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthEntry {
    pub entity: String,
    pub key: String,
    #[serde(default)]
    pub caps: BTreeMap<String, String>,
}

impl AuthEntry {
    /// Render as a keyring file.
    pub fn to_keyring(&self) -> String {
        let mut out = format!("[{}]\n\tkey = {}\n", self.entity, self.key);
        for (subsystem, grant) in &self.caps {
            out.push_str(&format!("\tcaps {subsystem} = \"{grant}\"\n"));
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct Pool {
    poolname: String,
}

fn ceph_json<S: Session + ?Sized>(session: &S, argv: &[&str]) -> Result<String> {
    let out = check(session, argv, Some(CEPH_TIMEOUT))?;
    Ok(out.stdout.join("\n"))
}

/// Registered entities by name.
pub fn list_keys<S: Session + ?Sized>(session: &S) -> Result<BTreeMap<String, AuthEntry>> {
    let raw = ceph_json(session, &["ceph", "-f", "json", "auth", "list"])?;
    let dump: AuthDump = serde_json::from_str(raw.trim())
        .with_context(|| format!("{}: could not parse ceph auth list output", session.host()))?;
    Ok(dump
        .auth_dump
        .into_iter()
        .map(|entry| (entry.entity.clone(), entry))
        .collect())
}

/// Create a key for `entity` at `keypath`, grant gateway capabilities and
/// register it with the cluster.
pub fn generate_key<S: Session + ?Sized>(session: &S, keypath: &str, entity: &str) -> Result<()> {
    log::info!("{}: generating key for {entity}", session.host());
    check(
        session,
        &["ceph-authtool", "-C", "-n", entity, "--gen-key", keypath],
        Some(CEPH_TIMEOUT),
    )
    .context("Could not generate key")?;
    check(
        session,
        &[
            "ceph-authtool", "-n", entity, "--cap", "osd", "allow rwx", "--cap", "mon", "allow rwx",
            keypath,
        ],
        Some(CEPH_TIMEOUT),
    )
    .context("Could not set capabilities")?;
    check(
        session,
        &["ceph", "auth", "add", entity, "--in-file", keypath],
        Some(CEPH_TIMEOUT),
    )
    .with_context(|| format!("Could not add auth info for {entity}"))?;
    Ok(())
}

/// Remove an entity's key from the cluster.
pub fn deauth<S: Session + ?Sized>(session: &S, entity: &str) -> Result<()> {
    log::info!("{}: removing key for {entity}", session.host());
    check(session, &["ceph", "auth", "del", entity], Some(CEPH_TIMEOUT))?;
    Ok(())
}

/// Create required pools that do not exist. Returns the created names.
pub fn ensure_pools<S: Session + ?Sized>(session: &S) -> Result<Vec<String>> {
    let raw = ceph_json(session, &["ceph", "-f", "json", "osd", "lspools"])?;
    let pools: Vec<Pool> = serde_json::from_str(raw.trim())
        .with_context(|| format!("{}: could not parse ceph osd lspools output", session.host()))?;

    let pg_num = POOL_PG_NUM.to_string();
    let mut created = Vec::new();
    for name in REQUIRED_POOLS {
        if pools.iter().any(|p| p.poolname == *name) {
            continue;
        }
        log::info!("{}: creating pool {name}", session.host());
        check(
            session,
            &["ceph", "osd", "pool", "create", name, &pg_num],
            Some(CEPH_TIMEOUT),
        )?;
        created.push((*name).to_string());
    }
    Ok(created)
}
