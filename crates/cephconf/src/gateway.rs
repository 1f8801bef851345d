//! Gateway (radosgw) entity naming and the host sets derived from a config.

use crate::store::ClusterConfig;

/// Section prefix of every gateway entity.
pub const ENTITY_PREFIX: &str = "client.radosgw.";

/// Section holding cluster-wide options.
pub const GLOBAL: &str = "global";

/// `gw1` -> `client.radosgw.gw1`. Already prefixed names are kept.
pub fn entity_name(name: &str) -> String {
    if name.starts_with(ENTITY_PREFIX) {
        name.to_string()
    } else {
        format!("{ENTITY_PREFIX}{name}")
    }
}

/// `client.radosgw.gw1` -> `gw1`. Unprefixed names are kept.
pub fn instance_name(entity: &str) -> &str {
    entity.strip_prefix(ENTITY_PREFIX).unwrap_or(entity)
}

/// Default file locations of a gateway entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPaths {
    /// Keyring on the gateway host
    pub keyring: String,
    /// FastCGI socket shared with Apache
    pub socket: String,
    /// Daemon log
    pub log_file: String,
    /// Admin socket
    pub admin_socket: String,
}

impl GatewayPaths {
    /// Paths derived from the cluster and entity names.
    pub fn for_entity(cluster: &str, entity: &str) -> Self {
        Self {
            keyring: format!("/etc/ceph/{cluster}.{entity}.keyring"),
            socket: format!("/var/run/ceph-radosgw/{cluster}.{entity}.fastcgi.sock"),
            log_file: format!("/var/log/ceph-radosgw/{cluster}.{entity}.log"),
            admin_socket: format!("/var/run/ceph-radosgw/{cluster}.{entity}.asok"),
        }
    }

    /// Fields a gateway section should carry when bound to `host`.
    pub fn desired_fields<'a>(&'a self, host: &'a str) -> [(&'static str, &'a str); 5] {
        [
            ("host", host),
            ("keyring", &self.keyring),
            ("rgw socket path", &self.socket),
            ("log file", &self.log_file),
            ("admin socket", &self.admin_socket),
        ]
    }
}

/// A gateway entity as recorded in the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gateway {
    /// Full section name (`client.radosgw.<name>`)
    pub entity: String,
    /// Host the gateway is bound to, if recorded
    pub host: Option<String>,
    /// Keyring path, if recorded
    pub keyring: Option<String>,
    /// FastCGI socket path, if recorded
    pub socket: Option<String>,
    /// Log file, if recorded
    pub log_file: Option<String>,
}

impl Gateway {
    /// Instance name without the entity prefix.
    pub fn name(&self) -> &str {
        instance_name(&self.entity)
    }
}

/// Every gateway section, in config order.
pub fn gateways(config: &ClusterConfig) -> Vec<Gateway> {
    config
        .sections()
        .filter(|s| s.starts_with(ENTITY_PREFIX))
        .map(|entity| {
            let field = |key: &str| config.get(entity, key).map(str::to_string);
            Gateway {
                entity: entity.to_string(),
                host: field("host"),
                keyring: field("keyring"),
                socket: field("rgw socket path"),
                log_file: field("log file"),
            }
        })
        .collect()
}

/// Monitor hosts from `mon_initial_members`, deduplicated in order.
pub fn mon_hosts(config: &ClusterConfig) -> Vec<String> {
    let mut hosts = Vec::new();
    let Some(raw) = config.get(GLOBAL, "mon_initial_members") else {
        return hosts;
    };
    for host in raw.split(',').map(str::trim).filter(|h| !h.is_empty()) {
        push_unique(&mut hosts, host);
    }
    hosts
}

/// Hosts that receive the config after a gateway change: monitors plus every
/// host a gateway is bound to.
pub fn push_hosts(config: &ClusterConfig) -> Vec<String> {
    let mut hosts = mon_hosts(config);
    for gateway in gateways(config) {
        if let Some(host) = &gateway.host {
            push_unique(&mut hosts, host);
        }
    }
    hosts
}

/// Append `host` unless already present.
pub fn push_unique(hosts: &mut Vec<String>, host: &str) {
    if !hosts.iter().any(|h| h == host) {
        hosts.push(host.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "[global]\n\
mon initial members = node1, node2,node1\n\
\n\
[client.radosgw.gw1]\n\
host = node3\n\
rgw_socket_path = /tmp/gw1.sock\n\
\n\
[client.radosgw.gw2]\n\
host = node1\n\
\n\
[osd.0]\n\
host = node4\n";

    #[test]
    fn test_entity_translation() {
        assert_eq!(entity_name("gw1"), "client.radosgw.gw1");
        assert_eq!(entity_name("client.radosgw.gw1"), "client.radosgw.gw1");
        assert_eq!(instance_name("client.radosgw.gw1"), "gw1");
        assert_eq!(instance_name("gw1"), "gw1");
    }

    #[test]
    fn test_default_paths() {
        let paths = GatewayPaths::for_entity("ceph", "client.radosgw.gw1");
        assert_eq!(paths.keyring, "/etc/ceph/ceph.client.radosgw.gw1.keyring");
        assert_eq!(
            paths.socket,
            "/var/run/ceph-radosgw/ceph.client.radosgw.gw1.fastcgi.sock"
        );

        let fields = paths.desired_fields("node3");
        assert_eq!(fields[0], ("host", "node3"));
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn test_paths_follow_cluster_name() {
        let paths = GatewayPaths::for_entity("backup", "client.radosgw.gw1");
        assert_eq!(paths.keyring, "/etc/ceph/backup.client.radosgw.gw1.keyring");
        assert_eq!(paths.log_file, "/var/log/ceph-radosgw/backup.client.radosgw.gw1.log");
        assert_eq!(paths.admin_socket, "/var/run/ceph-radosgw/backup.client.radosgw.gw1.asok");
        assert!(paths.socket.contains("/backup.client.radosgw.gw1."));
    }

    #[test]
    fn test_gateways_skip_other_sections() {
        let config = ClusterConfig::parse(CONFIG).unwrap();
        let found = gateways(&config);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name(), "gw1");
        assert_eq!(found[0].host.as_deref(), Some("node3"));
        assert_eq!(found[0].socket.as_deref(), Some("/tmp/gw1.sock"));
        assert_eq!(found[1].keyring, None);
    }

    #[test]
    fn test_mon_and_push_hosts() {
        let config = ClusterConfig::parse(CONFIG).unwrap();
        assert_eq!(mon_hosts(&config), vec!["node1", "node2"]);
        assert_eq!(push_hosts(&config), vec!["node1", "node2", "node3"]);
    }

    #[test]
    fn test_no_monitors() {
        let config = ClusterConfig::new();
        assert!(mon_hosts(&config).is_empty());
    }
}
