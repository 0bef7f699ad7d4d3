//! Nimbus Cloud Provider Abstraction
//!
//! This crate defines the capability set every cloud adapter implements,
//! together with the fan-out engine adapters use to enumerate resources
//! across services and regions.
//!
//! # Supported Providers
//!
//! - **AWS**: EC2, S3, IAM, VPC, ELB, EKS, KMS, RDS, SSM, STS (`nimbus-cloud-aws`)
//! - **阿里云**: sample inventory (`nimbus-cloud-aliyun`)
//! - **GCP**: sample inventory (`nimbus-cloud-gcp`)
//! - **Azure**: sample inventory (`nimbus-cloud-azure`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           nimbus-controlplane (worker)          │
//! │        enumerate / escalate / operate ...       │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                  nimbus-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider Abstraction            │   │
//! │  │  trait CloudProvider { ... }             │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │   Fan-out    │  │   Catalog    │             │
//! │  └──────────────┘  └──────────────┘             │
//! └───────┬─────────────┬────────────┬──────────────┘
//!         │             │            │
//! ┌───────▼─────┐ ┌─────▼─────┐ ┌────▼──────────────┐
//! │     aws     │ │  aliyun   │ │   gcp / azure     │
//! └─────────────┘ └───────────┘ └───────────────────┘
//! ```

pub mod catalog;
pub mod error;
pub mod fanout;
pub mod provider;
pub mod report;

// Re-exports
pub use catalog::{ALL_RESOURCES, ResourceCatalog};
pub use error::{CloudError, Result};
pub use fanout::{
    BULK_LISTING_DEADLINE, DEFAULT_CALL_DEADLINE, FanOut, Inventory, Scope, ServiceCall, Unit,
};
pub use provider::{CloudCredentials, CloudProvider, OperateRequest, ProviderTag, RetryConfig};
pub use report::{
    EscalationReport, OperationAttempt, PermissionReport, RiskLevel, TakeoverReport,
};
