//! In-memory AWS for tests
//!
//! Fixtures are keyed by region. Failures are injected per operation name
//! (the `AwsApi` method name, or `connect`) and optionally per region.

use crate::client::{AwsApi, AwsConnector};
use crate::error::{AwsError, Result};
use crate::model::*;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct MockBucket {
    summary: BucketSummary,
    location: String,
    pages: Vec<Vec<S3Object>>,
    broken_page: Option<(usize, String)>,
}

#[derive(Debug, Default)]
struct MockState {
    instances: BTreeMap<String, Vec<Ec2Instance>>,
    vpcs: BTreeMap<String, Vec<Vpc>>,
    buckets: Vec<MockBucket>,
    users: Vec<IamUser>,
    roles: Vec<IamRole>,
    instance_profiles: Vec<String>,
    current_user: Option<std::result::Result<String, String>>,
    attached_policies: Vec<String>,
    invocation: CommandInvocation,
    failures: Vec<(String, Option<String>, String)>,
    delays: BTreeMap<String, Duration>,
    journal: Vec<String>,
}

/// Shared handle to an in-memory account
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_instance(self, region: &str, instance: Ec2Instance) -> Self {
        self.state()
            .instances
            .entry(region.to_string())
            .or_default()
            .push(instance);
        self
    }

    pub fn with_vpc(self, region: &str, vpc: Vpc) -> Self {
        self.state().vpcs.entry(region.to_string()).or_default().push(vpc);
        self
    }

    /// A bucket whose objects come back in the given pages
    pub fn with_bucket(self, name: &str, location: &str, pages: Vec<Vec<S3Object>>) -> Self {
        self.state().buckets.push(MockBucket {
            summary: BucketSummary {
                name: name.to_string(),
                creation_date: "2024-01-01T00:00:00Z".to_string(),
            },
            location: location.to_string(),
            pages,
            broken_page: None,
        });
        self
    }

    /// Make one page of a bucket fail
    pub fn fail_page(self, bucket: &str, index: usize, message: &str) -> Self {
        if let Some(b) = self.state().buckets.iter_mut().find(|b| b.summary.name == bucket) {
            b.broken_page = Some((index, message.to_string()));
        }
        self
    }

    pub fn with_user(self, user_name: &str) -> Self {
        self.state().users.push(IamUser {
            user_name: user_name.to_string(),
            user_id: format!("AIDA{}", user_name.to_uppercase()),
            arn: format!("arn:aws:iam::123456789012:user/{}", user_name),
        });
        self
    }

    pub fn with_role(self, role_name: &str) -> Self {
        self.state().roles.push(IamRole {
            role_name: role_name.to_string(),
            role_id: format!("AROA{}", role_name.to_uppercase()),
            arn: format!("arn:aws:iam::123456789012:role/{}", role_name),
        });
        self
    }

    pub fn with_instance_profile(self, profile_name: &str) -> Self {
        self.state().instance_profiles.push(profile_name.to_string());
        self
    }

    /// Outcome of `GetUser` for the caller
    pub fn with_current_user(self, outcome: std::result::Result<&str, &str>) -> Self {
        self.state().current_user = Some(outcome.map(str::to_string).map_err(str::to_string));
        self
    }

    pub fn with_attached_policies(self, policies: &[&str]) -> Self {
        self.state().attached_policies = policies.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_invocation(self, invocation: CommandInvocation) -> Self {
        self.state().invocation = invocation;
        self
    }

    /// Fail `operation`, in one region or everywhere
    pub fn fail(self, operation: &str, region: Option<&str>, message: &str) -> Self {
        self.state().failures.push((
            operation.to_string(),
            region.map(str::to_string),
            message.to_string(),
        ));
        self
    }

    /// Delay `operation` before it answers
    pub fn delay(self, operation: &str, by: Duration) -> Self {
        self.state().delays.insert(operation.to_string(), by);
        self
    }

    /// Mutating calls made so far, oldest first
    pub fn journal(&self) -> Vec<String> {
        self.state().journal.clone()
    }

    async fn gate(&self, operation: &'static str, region: &str) -> Result<()> {
        let (delay, failure) = {
            let state = self.state();
            let failure = state
                .failures
                .iter()
                .find(|(op, r, _)| op == operation && r.as_deref().is_none_or(|r| r == region))
                .map(|(_, _, message)| message.clone());
            (state.delays.get(operation).copied(), failure)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(message) => Err(AwsError::api(operation, message)),
            None => Ok(()),
        }
    }

    fn record(&self, entry: String) {
        self.state().journal.push(entry);
    }
}

#[async_trait]
impl AwsConnector for MockConnector {
    async fn connect(&self, region: &str) -> Result<Arc<dyn AwsApi>> {
        self.gate("connect", region).await?;
        Ok(Arc::new(MockClient {
            region: region.to_string(),
            account: self.clone(),
        }))
    }

    async fn signin_token(&self, credentials: &FederationCredentials) -> Result<String> {
        self.gate("signin_token", "").await?;
        Ok(format!("signin-{}", credentials.access_key_id))
    }
}

/// Region-bound view of a [`MockConnector`]
struct MockClient {
    region: String,
    account: MockConnector,
}

impl MockClient {
    async fn gate(&self, operation: &'static str) -> Result<()> {
        self.account.gate(operation, &self.region).await
    }
}

#[async_trait]
impl AwsApi for MockClient {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances(&self) -> Result<Vec<Ec2Instance>> {
        self.gate("describe_instances").await?;
        Ok(self
            .account
            .state()
            .instances
            .get(&self.region)
            .cloned()
            .unwrap_or_default())
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<Ec2Instance>> {
        self.gate("describe_instance").await?;
        Ok(self
            .account
            .state()
            .instances
            .get(&self.region)
            .and_then(|list| list.iter().find(|i| i.instance_id == instance_id).cloned()))
    }

    async fn associate_instance_profile(&self, instance_id: &str, profile_name: &str) -> Result<()> {
        self.gate("associate_instance_profile").await?;
        self.account
            .record(format!("associate_instance_profile {} {}", instance_id, profile_name));
        Ok(())
    }

    async fn describe_vpcs(&self) -> Result<Vec<Vpc>> {
        self.gate("describe_vpcs").await?;
        Ok(self
            .account
            .state()
            .vpcs
            .get(&self.region)
            .cloned()
            .unwrap_or_default())
    }

    async fn describe_route_tables(&self) -> Result<Vec<RouteTable>> {
        self.gate("describe_route_tables").await?;
        Ok(Vec::new())
    }

    async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>> {
        self.gate("describe_load_balancers").await?;
        Ok(Vec::new())
    }

    async fn list_eks_clusters(&self) -> Result<Vec<EksCluster>> {
        self.gate("list_eks_clusters").await?;
        Ok(Vec::new())
    }

    async fn list_kms_keys(&self) -> Result<Vec<KmsKey>> {
        self.gate("list_kms_keys").await?;
        Ok(Vec::new())
    }

    async fn describe_db_instances(&self) -> Result<Vec<DbInstance>> {
        self.gate("describe_db_instances").await?;
        Ok(Vec::new())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        self.gate("list_buckets").await?;
        Ok(self
            .account
            .state()
            .buckets
            .iter()
            .map(|b| b.summary.clone())
            .collect())
    }

    async fn bucket_location(&self, bucket: &str) -> Result<String> {
        self.gate("bucket_location").await?;
        self.account
            .state()
            .buckets
            .iter()
            .find(|b| b.summary.name == bucket)
            .map(|b| b.location.clone())
            .ok_or_else(|| AwsError::api("bucket_location", "NoSuchBucket"))
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage> {
        self.gate("list_objects_page").await?;
        let state = self.account.state();
        let found = state
            .buckets
            .iter()
            .find(|b| b.summary.name == bucket)
            .ok_or_else(|| AwsError::api("list_objects_page", "NoSuchBucket"))?;

        let index = continuation
            .as_deref()
            .and_then(|token| token.strip_prefix("page-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        if let Some((broken, message)) = &found.broken_page {
            if *broken == index {
                return Err(AwsError::api("list_objects_page", message.clone()));
            }
        }

        let objects = found
            .pages
            .get(index)
            .map(|page| {
                page.iter()
                    .filter(|o| o.key.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let truncated = index + 1 < found.pages.len();
        Ok(ObjectPage {
            objects,
            truncated,
            next_token: truncated.then(|| format!("page-{}", index + 1)),
        })
    }

    async fn presign_get_object(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        self.gate("presign_get_object").await?;
        Ok(format!(
            "https://s3.{}.amazonaws.com/{}/{}?X-Amz-Expires={}",
            self.region,
            bucket,
            key,
            ttl.as_secs()
        ))
    }

    async fn list_users(&self) -> Result<Vec<IamUser>> {
        self.gate("list_users").await?;
        Ok(self.account.state().users.clone())
    }

    async fn list_roles(&self) -> Result<Vec<IamRole>> {
        self.gate("list_roles").await?;
        Ok(self.account.state().roles.clone())
    }

    async fn get_current_user(&self) -> Result<String> {
        self.gate("get_current_user").await?;
        match self.account.state().current_user.clone() {
            Some(Ok(name)) => Ok(name),
            Some(Err(message)) => Err(AwsError::api("get user", message)),
            None => Ok("mock-user".to_string()),
        }
    }

    async fn list_attached_user_policies(&self, _user_name: &str) -> Result<Vec<String>> {
        self.gate("list_attached_user_policies").await?;
        Ok(self.account.state().attached_policies.clone())
    }

    async fn create_role(&self, role_name: &str, _trust_policy: &str) -> Result<()> {
        self.gate("create_role").await?;
        self.account.record(format!("create_role {}", role_name));
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.gate("attach_role_policy").await?;
        self.account
            .record(format!("attach_role_policy {} {}", role_name, policy_arn));
        Ok(())
    }

    async fn list_instance_profiles(&self) -> Result<Vec<String>> {
        self.gate("list_instance_profiles").await?;
        Ok(self.account.state().instance_profiles.clone())
    }

    async fn create_instance_profile(&self, profile_name: &str) -> Result<()> {
        self.gate("create_instance_profile").await?;
        self.account
            .record(format!("create_instance_profile {}", profile_name));
        Ok(())
    }

    async fn add_role_to_instance_profile(&self, profile_name: &str, role_name: &str) -> Result<()> {
        self.gate("add_role_to_instance_profile").await?;
        self.account.record(format!(
            "add_role_to_instance_profile {} {}",
            profile_name, role_name
        ));
        Ok(())
    }

    async fn get_instance_profile(&self, profile_name: &str) -> Result<()> {
        self.gate("get_instance_profile").await?;
        self.account
            .record(format!("get_instance_profile {}", profile_name));
        Ok(())
    }

    async fn send_shell_command(&self, instance_id: &str, command: &str) -> Result<String> {
        self.gate("send_shell_command").await?;
        self.account
            .record(format!("send_shell_command {} {}", instance_id, command));
        Ok("cmd-0001".to_string())
    }

    async fn get_command_invocation(
        &self,
        _command_id: &str,
        _instance_id: &str,
    ) -> Result<CommandInvocation> {
        self.gate("get_command_invocation").await?;
        Ok(self.account.state().invocation.clone())
    }

    async fn get_caller_identity(&self) -> Result<CallerIdentity> {
        self.gate("get_caller_identity").await?;
        Ok(CallerIdentity {
            account: "123456789012".to_string(),
            arn: "arn:aws:iam::123456789012:user/mock-user".to_string(),
            user_id: "AIDAMOCK".to_string(),
        })
    }

    async fn get_federation_token(
        &self,
        name: &str,
        _policy: &str,
        duration: Duration,
    ) -> Result<FederationCredentials> {
        self.gate("get_federation_token").await?;
        self.account
            .record(format!("get_federation_token {} {}", name, duration.as_secs()));
        Ok(FederationCredentials {
            access_key_id: "ASIAFEDERATED".to_string(),
            secret_access_key: "federated-secret".to_string(),
            session_token: "federated-session".to_string(),
            expiration: "2030-01-01T00:00:00Z".to_string(),
        })
    }
}
