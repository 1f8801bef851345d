//! Error types for cluster configuration handling.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading, changing or saving a cluster config.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid INI syntax
    #[error("invalid config syntax at line {line}: {message}")]
    Parse {
        /// Line number where the parse error occurred (1-indexed)
        line: usize,
        /// Description of the syntax error
        message: String,
    },

    /// Section does not exist
    #[error("no section: {0}")]
    NoSection(String),

    /// Section already exists
    #[error("section already exists: {0}")]
    DuplicateSection(String),

    /// An entity is bound to a different host than requested
    #[error("'{entity}' is already bound to host '{bound}', not '{requested}'")]
    ConflictingBinding {
        /// Section name of the entity
        entity: String,
        /// Host recorded in the config
        bound: String,
        /// Host that was requested
        requested: String,
    },

    /// A file that must not be clobbered already exists
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    /// Config file not found
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, Error>;
