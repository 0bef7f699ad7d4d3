//! Region-scoped AWS API seam
//!
//! ```text
//! ┌─────────────┐  connect(region)  ┌──────────────┐
//! │ AwsProvider │ ────────────────> │ AwsConnector │
//! └─────────────┘                   └──────┬───────┘
//!        │                                 │
//!        │        Arc<dyn AwsApi>          │
//!        └─────────────────────────────────┘
//! ```
//!
//! The provider never talks to an SDK type directly. A connector hands out
//! one client per region; the SDK-backed connector lives behind the `sdk`
//! feature and the in-memory one behind `test-utils`.

use crate::error::Result;
use crate::model::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// The AWS calls the adapter makes, bound to one region
#[async_trait]
pub trait AwsApi: Send + Sync {
    fn region(&self) -> &str;

    // EC2
    async fn describe_instances(&self) -> Result<Vec<Ec2Instance>>;
    async fn describe_instance(&self, instance_id: &str) -> Result<Option<Ec2Instance>>;
    async fn associate_instance_profile(&self, instance_id: &str, profile_name: &str) -> Result<()>;
    async fn describe_vpcs(&self) -> Result<Vec<Vpc>>;
    async fn describe_route_tables(&self) -> Result<Vec<RouteTable>>;

    // ELB / EKS / KMS / RDS
    async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>>;
    async fn list_eks_clusters(&self) -> Result<Vec<EksCluster>>;
    async fn list_kms_keys(&self) -> Result<Vec<KmsKey>>;
    async fn describe_db_instances(&self) -> Result<Vec<DbInstance>>;

    // S3
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>>;
    /// Raw location constraint; empty means `us-east-1`
    async fn bucket_location(&self, bucket: &str) -> Result<String>;
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage>;
    async fn presign_get_object(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String>;

    // IAM
    async fn list_users(&self) -> Result<Vec<IamUser>>;
    async fn list_roles(&self) -> Result<Vec<IamRole>>;
    /// `GetUser` for the caller; the error text carries the root marker
    async fn get_current_user(&self) -> Result<String>;
    async fn list_attached_user_policies(&self, user_name: &str) -> Result<Vec<String>>;
    async fn create_role(&self, role_name: &str, trust_policy: &str) -> Result<()>;
    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;
    async fn list_instance_profiles(&self) -> Result<Vec<String>>;
    async fn create_instance_profile(&self, profile_name: &str) -> Result<()>;
    async fn add_role_to_instance_profile(&self, profile_name: &str, role_name: &str) -> Result<()>;
    async fn get_instance_profile(&self, profile_name: &str) -> Result<()>;

    // SSM
    /// Returns the command id
    async fn send_shell_command(&self, instance_id: &str, command: &str) -> Result<String>;
    async fn get_command_invocation(
        &self,
        command_id: &str,
        instance_id: &str,
    ) -> Result<CommandInvocation>;

    // STS
    async fn get_caller_identity(&self) -> Result<CallerIdentity>;
    async fn get_federation_token(
        &self,
        name: &str,
        policy: &str,
        duration: Duration,
    ) -> Result<FederationCredentials>;
}

/// Builds region-bound clients from one credential
#[async_trait]
pub trait AwsConnector: Send + Sync {
    async fn connect(&self, region: &str) -> Result<Arc<dyn AwsApi>>;

    /// Exchange temporary credentials for a console sign-in token
    async fn signin_token(&self, credentials: &FederationCredentials) -> Result<String>;
}
