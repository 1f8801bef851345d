//! Gateway arguments: `host[:instance][:fqdn][:port][:redirect]`.

use anyhow::{Result, bail};
use cephconf::gateway;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_REDIRECT: &str = "^/(.*)";

/// One gateway named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySpec {
    pub host: String,
    /// Full entity name (`client.radosgw.<instance>`)
    pub entity: String,
    pub fqdn: Option<String>,
    pub port: u16,
    pub redirect: String,
}

impl GatewaySpec {
    pub fn instance(&self) -> &str {
        gateway::instance_name(&self.entity)
    }
}

impl FromStr for GatewaySpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() > 5 {
            bail!("'{s}' must be in form host[:instance][:fqdn][:port][:redirect]");
        }
        let part = |i: usize| parts.get(i).copied().filter(|p| !p.is_empty());

        let Some(host) = part(0) else {
            bail!("invalid host in '{s}': expected host[:instance][:fqdn][:port][:redirect]");
        };

        let instance = part(1).unwrap_or_else(|| {
            log::info!("{host}: defaulting instance to {host}");
            host
        });

        let port = match part(3) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    log::warn!("{instance}: invalid port '{raw}', defaulting to {DEFAULT_PORT}");
                    DEFAULT_PORT
                }
            },
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            entity: gateway::entity_name(instance),
            fqdn: part(2).map(str::to_string),
            port,
            redirect: part(4).unwrap_or(DEFAULT_REDIRECT).to_string(),
        })
    }
}

/// Parse every gateway argument.
pub fn parse_all<S: AsRef<str>>(args: &[S]) -> Result<Vec<GatewaySpec>> {
    args.iter().map(|a| a.as_ref().parse()).collect()
}
