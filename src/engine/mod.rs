//! Execution engine for cephdeploy
//!
//! Commands hand the engine a list of hosts and a per-host operation. The
//! engine resolves each host, runs the operation, releases the connection
//! and records the outcome, one host at a time.

pub mod batch;

pub use batch::{Policy, print_summary, run_on_hosts};
