//! Error types for host detection and per-distro operations.

use thiserror::Error;

/// Errors that can occur while resolving or operating on a host.
#[derive(Debug, Error)]
pub enum Error {
    /// The distro is not in the registry, or is excluded for an operation.
    #[error("platform is not supported: {name} {codename} {release}")]
    UnsupportedPlatform {
        /// Distro name as reported by the host
        name: String,
        /// Release codename (may be empty)
        codename: String,
        /// Release version
        release: String,
    },

    /// The requested combination can never work on this host.
    ///
    /// Raised before any remote mutation is attempted.
    #[error("unsupported configuration on {host}: {message}")]
    UnsupportedConfiguration {
        /// Host the operation targeted
        host: String,
        /// What is impossible
        message: String,
    },

    /// The host did not report a usable identity.
    #[error("could not detect platform of {host}: {message}")]
    Undetected {
        /// Host being inspected
        host: String,
        /// What was missing
        message: String,
    },

    /// Remote file content differs and overwriting was not requested.
    #[error("config file {path} exists with different content on {host}; use --overwrite-conf to overwrite")]
    ConfigDiffers {
        /// Host holding the file
        host: String,
        /// Remote path
        path: String,
    },

    /// Session or command failure.
    #[error(transparent)]
    Remote(#[from] remote::Error),
}

impl Error {
    /// Whether this error comes from a remote command timing out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_timeout())
    }
}

/// Result type for host operations.
pub type Result<T> = std::result::Result<T, Error>;
