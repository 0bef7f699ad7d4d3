//! AWS provider for Nimbus
//!
//! Resource types: `ec2`, `s3`, `iam`, `vpc`, `route`, `elb`, `eks`, `kms`,
//! `rds`, `all`. Operations: `ec2.execute_command` (SSM), `s3.list_objects`,
//! `s3.download` (presigned URL), and `federated_login` for any type.
//!
//! The real SDK connector is compiled with the `sdk` feature. Without it
//! [`AwsProvider::connect`] fails with `SdkBootstrap`, and adapters can only
//! be built over an explicit [`AwsConnector`].

pub mod client;
pub mod error;
pub mod federation;
pub mod identity;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod model;
pub mod provider;
pub mod regions;
pub mod s3;
#[cfg(feature = "sdk")]
pub mod sdk;
pub mod ssm;

pub use client::{AwsApi, AwsConnector};
pub use error::{AwsError, Result};
pub use provider::{AwsProvider, CATALOG};
pub use regions::{AWS_REGIONS, DEFAULT_REGION};
pub use ssm::CeremonyTimings;
