//! Section-keyed INI store.
//!
//! ```text
//! [global]
//! fsid = 6f1c...
//! mon_initial_members = node1, node2
//!
//! [client.radosgw.gw1]
//! host = node3
//! rgw socket path = /var/run/ceph-radosgw/ceph.client.radosgw.gw1.fastcgi.sock
//! ```
//!
//! Keys compare with spaces and underscores treated alike, so
//! `rgw socket path` and `rgw_socket_path` name the same option. The
//! spelling first written is kept on output. Comments are dropped.

use crate::error::{Error, Result};
use std::fmt;

/// Canonical form of a key for comparisons.
fn normalize_key(key: &str) -> String {
    key.split(|c: char| c.is_whitespace() || c == '_')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn position(&self, key: &str) -> Option<usize> {
        let wanted = normalize_key(key);
        self.entries
            .iter()
            .position(|(k, _)| normalize_key(k) == wanted)
    }
}

/// An ordered set of sections holding ordered `key = value` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterConfig {
    sections: Vec<Section>,
}

impl ClusterConfig {
    /// An empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI text.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::new();
        let mut current: Option<usize> = None;

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| Error::Parse {
                    line: index + 1,
                    message: format!("unterminated section header: {line}"),
                })?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::Parse {
                        line: index + 1,
                        message: "empty section name".to_string(),
                    });
                }
                current = Some(match config.index_of(name) {
                    Some(i) => i,
                    None => {
                        config.sections.push(Section {
                            name: name.to_string(),
                            entries: Vec::new(),
                        });
                        config.sections.len() - 1
                    }
                });
                continue;
            }

            let Some(section) = current else {
                return Err(Error::Parse {
                    line: index + 1,
                    message: format!("option outside of any section: {line}"),
                });
            };

            let (key, value) = line
                .split_once('=')
                .or_else(|| line.split_once(':'))
                .ok_or_else(|| Error::Parse {
                    line: index + 1,
                    message: format!("expected 'key = value': {line}"),
                })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::Parse {
                    line: index + 1,
                    message: "empty key".to_string(),
                });
            }
            config.put(section, key, value.trim());
        }

        Ok(config)
    }

    fn index_of(&self, section: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == section)
    }

    fn put(&mut self, section: usize, key: &str, value: &str) {
        let section = &mut self.sections[section];
        match section.position(key) {
            Some(i) => section.entries[i].1 = value.to_string(),
            None => section.entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Whether a section exists.
    pub fn has_section(&self, section: &str) -> bool {
        self.index_of(section).is_some()
    }

    /// Add an empty section at the end.
    pub fn add_section(&mut self, section: &str) -> Result<()> {
        if self.has_section(section) {
            return Err(Error::DuplicateSection(section.to_string()));
        }
        self.sections.push(Section {
            name: section.to_string(),
            entries: Vec::new(),
        });
        Ok(())
    }

    /// Value of an option.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let section = &self.sections[self.index_of(section)?];
        section
            .position(key)
            .map(|i| section.entries[i].1.as_str())
    }

    /// Set an option; the section must exist.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        let index = self
            .index_of(section)
            .ok_or_else(|| Error::NoSection(section.to_string()))?;
        self.put(index, key, value);
        Ok(())
    }

    /// Remove an option. Returns whether it existed.
    pub fn remove_option(&mut self, section: &str, key: &str) -> bool {
        let Some(index) = self.index_of(section) else {
            return false;
        };
        let section = &mut self.sections[index];
        match section.position(key) {
            Some(i) => {
                section.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Remove a section. Returns whether it existed.
    pub fn remove_section(&mut self, section: &str) -> bool {
        match self.index_of(section) {
            Some(i) => {
                self.sections.remove(i);
                true
            }
            None => false,
        }
    }

    /// Section names in order.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Entries of a section in order.
    pub fn items(&self, section: &str) -> Option<&[(String, String)]> {
        self.index_of(section)
            .map(|i| self.sections[i].entries.as_slice())
    }
}

impl fmt::Display for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in &section.entries {
                writeln!(f, "{key} = {value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[global]\n\
fsid = 6f1c2d5e-0000-4000-8000-000000000001\n\
mon_initial_members = node1, node2\n\
mon_host = 10.0.0.1,10.0.0.2\n\
\n\
[client.radosgw.gw1]\n\
host = node3\n\
keyring = /etc/ceph/ceph.client.radosgw.gw1.keyring\n\
\n";

    #[test]
    fn test_parse_and_serialize_round_trip() {
        let config = ClusterConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.to_string(), SAMPLE);
    }

    #[test]
    fn test_sections_in_order() {
        let config = ClusterConfig::parse(SAMPLE).unwrap();
        let sections: Vec<&str> = config.sections().collect();
        assert_eq!(sections, vec!["global", "client.radosgw.gw1"]);
    }

    #[test]
    fn test_space_and_underscore_keys_match() {
        let mut config = ClusterConfig::parse(SAMPLE).unwrap();
        assert_eq!(
            config.get("global", "mon initial members"),
            Some("node1, node2")
        );

        config
            .set("client.radosgw.gw1", "rgw_socket_path", "/tmp/a.sock")
            .unwrap();
        config
            .set("client.radosgw.gw1", "rgw socket path", "/tmp/b.sock")
            .unwrap();
        let items = config.items("client.radosgw.gw1").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2], ("rgw_socket_path".to_string(), "/tmp/b.sock".to_string()));
    }

    #[test]
    fn test_comments_and_indentation() {
        let config = ClusterConfig::parse(
            "# generated\n[global]\n\tfsid = abc\n; old\n    auth supported = cephx\n",
        )
        .unwrap();
        assert_eq!(config.get("global", "fsid"), Some("abc"));
        assert_eq!(config.get("global", "auth_supported"), Some("cephx"));
        assert_eq!(config.to_string(), "[global]\nfsid = abc\nauth supported = cephx\n\n");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ClusterConfig::parse("fsid = abc\n"),
            Err(Error::Parse { line: 1, .. })
        ));
        assert!(matches!(
            ClusterConfig::parse("[global]\n[broken\n"),
            Err(Error::Parse { line: 2, .. })
        ));
        assert!(matches!(
            ClusterConfig::parse("[global]\nnot an option\n"),
            Err(Error::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_section_operations() {
        let mut config = ClusterConfig::new();
        config.add_section("global").unwrap();
        assert!(matches!(
            config.add_section("global"),
            Err(Error::DuplicateSection(_))
        ));
        assert!(matches!(
            config.set("missing", "k", "v"),
            Err(Error::NoSection(_))
        ));

        config.set("global", "fsid", "abc").unwrap();
        assert!(config.remove_option("global", "fsid"));
        assert!(!config.remove_option("global", "fsid"));
        assert!(config.remove_section("global"));
        assert!(!config.has_section("global"));
        assert_eq!(config.to_string(), "");
    }
}
