//! # cephconf
//!
//! The cluster configuration file (`<cluster>.conf`) kept in the working
//! directory and pushed to hosts.
//!
//! This crate provides:
//! - [`ClusterConfig`]: an ordered INI store with normalised option keys
//! - [`load`] and [`save`]: persistence through an exclusive temp file and an
//!   atomic move, with [`SaveMode::CreateNew`] for no-clobber writes
//! - [`reconcile`]: merge desired entity fields without overriding values
//!   already present
//! - [`gateway`]: radosgw entity naming, default paths and derived host sets
//!
//! ## Example
//!
//! ```no_run
//! use cephconf::{SaveMode, gateway, load, reconcile, save};
//! use std::path::Path;
//!
//! let path = Path::new("ceph.conf");
//! let mut config = load(path).expect("load");
//!
//! let entity = gateway::entity_name("gw1");
//! let paths = gateway::GatewayPaths::for_entity("ceph", &entity);
//! let outcome = reconcile(&mut config, &entity, &paths.desired_fields("node3")).expect("reconcile");
//! if outcome.changed {
//!     save(&config, path, SaveMode::Replace).expect("save");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod gateway;
pub mod persist;
pub mod reconcile;
pub mod store;

pub use error::{Error, Result};
pub use persist::{SaveMode, cluster_path, load, load_raw, save};
pub use reconcile::{Reconciliation, reconcile};
pub use store::ClusterConfig;
