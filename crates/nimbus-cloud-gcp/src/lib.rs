//! GCP provider for Nimbus
//!
//! Resource types: `compute`, `storage`, `iam`, `all`.

pub mod provider;

pub use provider::{CATALOG, GcpProvider};
