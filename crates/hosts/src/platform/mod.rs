//! Per-family operation sets.
//!
//! The [`Platform`] trait is the fixed capability interface every OS family
//! provides. The registry binds one static implementation to each resolved
//! [`Distro`](crate::Distro); callers never match on the family themselves.

pub mod debian;
pub mod rpm;
pub mod suse;

use crate::distro::{Family, Host};
use crate::error::Result;
use std::fmt;

/// Which package stream to install from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionKind {
    /// A named stable release (`firefly`, `hammer`, ...)
    Stable(String),
    /// The current testing stream
    Testing,
    /// An autobuilt development branch
    Dev(String),
}

impl VersionKind {
    /// Stream name used in repository URLs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stable(_) => "stable",
            Self::Testing => "testing",
            Self::Dev(_) => "dev",
        }
    }

    /// Release or branch name, if any.
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Stable(v) | Self::Dev(v) => Some(v),
            Self::Testing => None,
        }
    }

    /// Whether packages come from the release key (vs the autobuild key).
    pub fn is_release(&self) -> bool {
        !matches!(self, Self::Dev(_))
    }
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version() {
            Some(v) => write!(f, "{} version {v}", self.kind()),
            None => f.write_str(self.kind()),
        }
    }
}

/// Parameters of a standard install.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Package stream
    pub version: VersionKind,
    /// Whether to (re)configure the package repositories first
    pub adjust_repos: bool,
}

/// A user supplied package mirror.
#[derive(Debug, Clone)]
pub struct Mirror {
    /// Repository base URL
    pub repo_url: String,
    /// Signing key URL (`file://` paths are allowed)
    pub gpg_url: String,
}

impl Mirror {
    /// Base URL without trailing slashes.
    pub fn base(&self) -> &str {
        self.repo_url.trim_end_matches('/')
    }

    /// The key location with any `file://` scheme removed.
    pub fn gpg_path(&self) -> &str {
        self.gpg_url
            .rsplit_once("file://")
            .map_or(self.gpg_url.as_str(), |(_, p)| p)
    }
}

/// A custom repository definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    /// Repository id, also the file name
    pub name: String,
    /// Human readable name
    pub display_name: Option<String>,
    /// Base URL
    pub baseurl: String,
    /// Signing key URL
    pub gpgkey: Option<String>,
    /// Whether the repository is enabled
    pub enabled: bool,
    /// Whether package signatures are checked
    pub gpgcheck: bool,
    /// HTTP proxy for this repository
    pub proxy: Option<String>,
    /// Install ceph from the repository after adding it
    pub install_ceph: bool,
}

impl RepoSpec {
    /// A repository with defaults: enabled, signature checking on.
    pub fn new(name: impl Into<String>, baseurl: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            baseurl: baseurl.into(),
            gpgkey: None,
            enabled: true,
            gpgcheck: true,
            proxy: None,
            install_ceph: false,
        }
    }

    /// Render an rpm-style `.repo` section.
    pub fn to_rpm_repo(&self, repo_type: &str) -> String {
        let mut out = format!("[{}]\n", self.name);
        out.push_str(&format!(
            "name={}\n",
            self.display_name
                .clone()
                .unwrap_or_else(|| format!("{} repo", self.name))
        ));
        out.push_str(&format!("baseurl={}\n", self.baseurl.trim_end_matches('/')));
        out.push_str(&format!("enabled={}\n", u8::from(self.enabled)));
        out.push_str(&format!("gpgcheck={}\n", u8::from(self.gpgcheck)));
        out.push_str(&format!("type={repo_type}\n"));
        if let Some(key) = &self.gpgkey {
            out.push_str(&format!("gpgkey={key}\n"));
        }
        if let Some(proxy) = &self.proxy {
            out.push_str(&format!("proxy={proxy}\n"));
        }
        out
    }
}

/// How Apache modules are switched on for the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApacheModules {
    /// Append to `APACHE_MODULES` in a sysconfig file
    Sysconfig(&'static str),
    /// Run `a2enmod`
    A2enmod,
    /// Modules are loaded by the packaged configuration
    Builtin,
}

/// Where Apache expects gateway files on a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApacheLayout {
    /// Packages providing Apache and FastCGI support
    pub packages: &'static [&'static str],
    /// Directory for vhost configuration snippets
    pub conf_dir: &'static str,
    /// Directory for FastCGI wrapper scripts
    pub fcgi_dir: &'static str,
    /// Group the web server runs as
    pub group: &'static str,
    /// Module activation
    pub modules: ApacheModules,
}

/// Operations every OS family provides.
///
/// Implementations are stateless unit structs; all host state lives on the
/// [`Host`] passed in.
pub trait Platform: Send + Sync {
    /// Family this implementation serves.
    fn family(&self) -> Family;

    /// Install ceph from the upstream repositories.
    fn install(&self, host: &Host, request: &InstallRequest) -> Result<()>;

    /// Install ceph from a mirror.
    fn mirror_install(&self, host: &Host, mirror: &Mirror, adjust_repos: bool) -> Result<()>;

    /// Add a custom repository, optionally installing ceph from it.
    fn repo_install(&self, host: &Host, repo: &RepoSpec) -> Result<()>;

    /// Remove ceph packages; `purge` also removes their configuration.
    fn uninstall(&self, host: &Host, purge: bool) -> Result<()>;

    /// Apache layout for gateway setup.
    fn apache(&self) -> ApacheLayout;

    /// Map a generic service name to this family's name.
    fn service_mapping<'a>(&self, service: &'a str) -> &'a str {
        service
    }
}
