//! Aliyun (阿里云) provider for Nimbus
//!
//! Implements the `CloudProvider` capability set for Aliyun.
//!
//! # Resource types
//!
//! - `ecs`: ECS instances
//! - `oss`: OSS buckets
//! - `ram`: RAM users and roles
//! - `all`: everything above
//!
//! # Example
//!
//! ```ignore
//! use nimbus_cloud::{CloudCredentials, CloudProvider};
//! use nimbus_cloud_aliyun::AliyunProvider;
//!
//! let provider = AliyunProvider::new(CloudCredentials::new("LTAI...", "secret", None))?;
//! let inventory = provider.enumerate("ram").await?;
//! ```

pub mod provider;

pub use provider::{AliyunProvider, CATALOG};
