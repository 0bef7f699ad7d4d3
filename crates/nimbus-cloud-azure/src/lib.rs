//! Azure provider for Nimbus
//!
//! Resource types: `compute` (virtual machines), `storage` (storage
//! accounts), `iam` (role assignments), `all`.

pub mod provider;

pub use provider::{AzureProvider, CATALOG};
