//! Merge desired entity fields into a persisted config.
//!
//! Values already in the config win over computed defaults. Only missing
//! fields (or a missing section) are written. An entity's `host` field is
//! authoritative: requesting a different host is a conflict.

use crate::error::{Error, Result};
use crate::store::ClusterConfig;

/// Field naming the host an entity is bound to.
pub const HOST_FIELD: &str = "host";

/// Result of reconciling one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Effective value of every requested field, in request order
    pub fields: Vec<(String, String)>,
    /// Whether the config was modified
    pub changed: bool,
}

impl Reconciliation {
    /// Effective value of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Reconcile `desired` fields of `entity` against `config`.
///
/// Fails with [`Error::ConflictingBinding`] before touching the config when
/// the entity is bound to another host.
pub fn reconcile(
    config: &mut ClusterConfig,
    entity: &str,
    desired: &[(&str, &str)],
) -> Result<Reconciliation> {
    if let Some((_, requested)) = desired.iter().find(|(k, _)| *k == HOST_FIELD)
        && let Some(bound) = config.get(entity, HOST_FIELD)
        && bound != *requested
    {
        log::error!("'{entity}' is already installed on '{bound}' and not '{requested}'");
        return Err(Error::ConflictingBinding {
            entity: entity.to_string(),
            bound: bound.to_string(),
            requested: (*requested).to_string(),
        });
    }

    let mut changed = false;
    if !config.has_section(entity) {
        config.add_section(entity)?;
        changed = true;
    }

    let mut fields = Vec::with_capacity(desired.len());
    for (key, value) in desired {
        let effective = match config.get(entity, key) {
            Some(existing) => existing.to_string(),
            None => {
                config.set(entity, key, value)?;
                changed = true;
                (*value).to_string()
            }
        };
        fields.push(((*key).to_string(), effective));
    }

    Ok(Reconciliation { fields, changed })
}
