//! # remote
//!
//! Scoped sessions to the hosts a deployment runs against.
//!
//! This crate provides:
//! - A [`Session`] trait: run commands and manage files on one host
//! - A [`Connector`] trait that opens sessions and returns them wrapped in a
//!   [`Connection`], which releases the session exactly once
//! - An ssh transport ([`SshConnector`]) with local execution for this machine
//! - A scripted in-memory transport ([`memory`]) for tests
//!
//! ## Example
//!
//! ```no_run
//! use remote::{Connector, HostTarget, SshConnector, check};
//! use std::time::Duration;
//!
//! let connector = SshConnector::new();
//! let conn = connector.open(&HostTarget::new("node1")).expect("connect");
//!
//! let out = check(&*conn, &["uname", "-m"], Some(Duration::from_secs(5))).expect("uname");
//! println!("{}", out.stdout_str());
//!
//! conn.release().expect("release");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod process;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use process::{ProcessSession, SshConnector};
pub use session::{Connection, Connector, Session, check};
pub use types::{CommandOutput, HostTarget, display_command};
