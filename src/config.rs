use anyhow::{Context, Result, bail};
use hosts::RepoSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the settings directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("cephdeploy"))
}

/// Get the settings file path
pub fn settings_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Expand `~` in a user-supplied directory.
pub fn expand_dir(dir: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(dir).as_ref())
}

// ============================================================================
// Settings
// ============================================================================

/// Tool settings (`~/.config/cephdeploy/config.toml`).
///
/// ```toml
/// [ssh]
/// connect_timeout = 10
///
/// [repos.ceph]
/// baseurl = "http://mirror.local/ceph/el7"
/// gpgkey = "http://mirror.local/release.asc"
/// default = true
/// extra_repos = ["ceph-extras"]
///
/// [repos.ceph-extras]
/// baseurl = "http://mirror.local/extras"
/// gpgkey = "http://mirror.local/release.asc"
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub repos: BTreeMap<String, RepoEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Seconds to wait for an ssh connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Extra `-o` options passed to ssh
    #[serde(default)]
    pub options: Vec<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            options: Vec::new(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoEntry {
    pub baseurl: Option<String>,
    pub gpgkey: Option<String>,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub gpgcheck: bool,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default, alias = "extra-repos")]
    pub extra_repos: Vec<String>,
    /// Use this repo when no `--release` names one
    #[serde(default)]
    pub default: bool,
}

impl Settings {
    /// Load settings, or defaults when the file does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// First repo marked `default = true`
    pub fn default_repo(&self) -> Option<&str> {
        self.repos
            .iter()
            .find(|(_, r)| r.default)
            .map(|(name, _)| name.as_str())
    }

    /// Repo to use: the one named by `release` if configured, else the default
    pub fn select_repo(&self, release: Option<&str>) -> Option<&str> {
        if let Some(release) = release
            && let Some((name, _)) = self.repos.get_key_value(release)
        {
            log::info!("will use repository from settings: {release}");
            return Some(name.as_str());
        }
        let default = self.default_repo();
        if let Some(name) = default {
            log::info!("will use default repository: {name}");
        }
        default
    }

    /// Build the repository definition for `name`.
    ///
    /// `baseurl` and `gpgkey` are required.
    pub fn repo_spec(&self, name: &str, install_ceph: bool) -> Result<RepoSpec> {
        let entry = self
            .repos
            .get(name)
            .with_context(|| format!("Repository '{name}' is not defined in settings"))?;

        let Some(baseurl) = &entry.baseurl else {
            bail!("missing required key: baseurl in repository: {name}");
        };
        let Some(gpgkey) = &entry.gpgkey else {
            bail!("missing required key: gpgkey in repository: {name}");
        };

        let mut spec = RepoSpec::new(name, baseurl);
        spec.display_name = entry.name.clone();
        spec.gpgkey = Some(gpgkey.clone());
        spec.enabled = entry.enabled;
        spec.gpgcheck = entry.gpgcheck;
        spec.proxy = entry.proxy.clone();
        spec.install_ceph = install_ceph;
        Ok(spec)
    }

    /// Repository definitions to add for `name`: the repo itself, then its extras
    pub fn repo_chain(&self, name: &str, install_ceph: bool) -> Result<Vec<RepoSpec>> {
        let mut specs = vec![self.repo_spec(name, install_ceph)?];
        let extras = self
            .repos
            .get(name)
            .map(|r| r.extra_repos.clone())
            .unwrap_or_default();
        for extra in extras {
            specs.push(self.repo_spec(&extra, false)?);
        }
        Ok(specs)
    }
}
