//! AWS provider implementation

use crate::client::{AwsApi, AwsConnector};
use crate::error::{AwsError, Result as AwsResult, within};
use crate::federation::{self, ADMIN_POLICY, FEDERATED_USER_NAME, FEDERATION_DURATION};
use crate::identity::{Identity, is_access_denied, is_auth_failure};
use crate::regions::{AWS_REGIONS, DEFAULT_REGION};
use crate::s3;
use crate::ssm::{self, CeremonyTimings};
use async_trait::async_trait;
use nimbus_cloud::{
    BULK_LISTING_DEADLINE, CloudCredentials, CloudError, CloudProvider, DEFAULT_CALL_DEADLINE,
    EscalationReport, FanOut, Inventory, OperateRequest, OperationAttempt, PermissionReport,
    ProviderTag, ResourceCatalog, RiskLevel, ServiceCall, TakeoverReport, Unit,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

const EC2: ServiceCall = ServiceCall::regional("instances", "EC2");
const S3: ServiceCall = ServiceCall::global("buckets", "S3").with_deadline(BULK_LISTING_DEADLINE);
const IAM_USERS: ServiceCall = ServiceCall::global("users", "IAM Users");
const IAM_ROLES: ServiceCall = ServiceCall::global("roles", "IAM Roles");
const VPC: ServiceCall = ServiceCall::regional("vpcs", "VPC");
const ROUTE_TABLES: ServiceCall = ServiceCall::regional("routeTables", "Route Tables");
const ELB: ServiceCall = ServiceCall::regional("elbs", "ELB");
const EKS: ServiceCall = ServiceCall::regional("eksClusters", "EKS");
const KMS: ServiceCall = ServiceCall::regional("kmsKeys", "KMS");
const RDS: ServiceCall = ServiceCall::regional("rdsInstances", "RDS");

/// `ec2 | s3 | iam | vpc | route | elb | eks | kms | rds | all`
pub const CATALOG: ResourceCatalog = ResourceCatalog::new(&[
    ("ec2", &[EC2]),
    ("s3", &[S3]),
    ("iam", &[IAM_USERS, IAM_ROLES]),
    ("vpc", &[VPC]),
    ("route", &[ROUTE_TABLES]),
    ("elb", &[ELB]),
    ("eks", &[EKS]),
    ("kms", &[KMS]),
    ("rds", &[RDS]),
]);

/// Permissions the escalation probe reports as observed
const PROBED_PERMISSIONS: [&str; 6] = [
    "ec2:DescribeInstances",
    "s3:ListBuckets",
    "iam:ListUsers",
    "iam:ListRoles",
    "s3:GetBucketLocation",
    "s3:ListObjectsV2",
];

const ESCALATION_PATHS: [&str; 3] = [
    "Create IAM user with admin privileges",
    "Modify existing IAM policies",
    "Access S3 buckets with sensitive data",
];

const ESCALATION_CHECKS: [&str; 3] = [
    "Checked IAM policies",
    "Checked EC2 instance profiles",
    "Checked S3 bucket policies",
];

/// AWS provider
///
/// Holds a connector rather than clients: every call picks the region it
/// needs (the unit's region, the bucket's region, the instance's region).
pub struct AwsProvider {
    connector: Arc<dyn AwsConnector>,
    region: Option<String>,
    timings: CeremonyTimings,
}

impl AwsProvider {
    /// Build an adapter backed by the AWS SDK
    #[cfg(feature = "sdk")]
    pub async fn connect(credentials: CloudCredentials) -> nimbus_cloud::Result<Self> {
        credentials.ensure_present()?;
        let region = credentials.region.clone();
        let connector = crate::sdk::SdkConnector::new(&credentials);
        connector
            .connect(region.as_deref().unwrap_or(DEFAULT_REGION))
            .await?;
        tracing::debug!(region = ?region, "AWS adapter ready");
        Ok(Self::with_connector(Arc::new(connector), region))
    }

    /// Build an adapter backed by the AWS SDK
    #[cfg(not(feature = "sdk"))]
    pub async fn connect(credentials: CloudCredentials) -> nimbus_cloud::Result<Self> {
        credentials.ensure_present()?;
        Err(CloudError::SdkBootstrap(
            "nimbus-cloud-aws was built without the `sdk` feature".to_string(),
        ))
    }

    pub fn with_connector(connector: Arc<dyn AwsConnector>, region: Option<String>) -> Self {
        Self {
            connector,
            region: region.filter(|r| !r.is_empty()),
            timings: CeremonyTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: CeremonyTimings) -> Self {
        self.timings = timings;
        self
    }

    fn home_region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    async fn home(&self) -> AwsResult<Arc<dyn AwsApi>> {
        self.connector.connect(self.home_region()).await
    }

    /// Records for one fan-out unit
    async fn collect(&self, unit: &Unit) -> AwsResult<Vec<Value>> {
        let region = unit.region.as_deref().unwrap_or(self.home_region());
        let api = self.connector.connect(region).await?;
        match unit.service.key {
            "instances" => records(api.describe_instances().await?),
            "buckets" => records(
                s3::walk_buckets(api.as_ref(), self.connector.as_ref(), self.region.as_deref())
                    .await?,
            ),
            "users" => records(api.list_users().await?),
            "roles" => records(api.list_roles().await?),
            "vpcs" => records(api.describe_vpcs().await?),
            "routeTables" => records(api.describe_route_tables().await?),
            "elbs" => records(api.describe_load_balancers().await?),
            "eksClusters" => records(api.list_eks_clusters().await?),
            "kmsKeys" => records(api.list_kms_keys().await?),
            "rdsInstances" => records(api.describe_db_instances().await?),
            other => Err(CloudError::UnsupportedResourceType(other.to_string()).into()),
        }
    }

    async fn execute_command(&self, request: &OperateRequest) -> AwsResult<Value> {
        let command = request
            .param_str("command")
            .ok_or_else(|| CloudError::BadParam("command is required".into()))?;
        let region = request
            .param_str("region")
            .unwrap_or(self.home_region())
            .to_string();
        let api = self.connector.connect(&region).await?;
        ssm::execute_command(api.as_ref(), &request.resource_id, command, &self.timings).await
    }

    async fn federated_login(&self) -> AwsResult<Value> {
        let region = self.home_region().to_string();
        let api = self.connector.connect(&region).await?;

        let credentials = within(
            DEFAULT_CALL_DEADLINE,
            "get federation token",
            api.get_federation_token(FEDERATED_USER_NAME, ADMIN_POLICY, FEDERATION_DURATION),
        )
        .await?;
        let signin_token = self.connector.signin_token(&credentials).await?;
        let login_url = federation::login_url(&signin_token)?;
        let is_root = Identity::probe(api.as_ref()).await.is_root();

        Ok(json!({
            "message": "Federated login successful",
            "federated_login_url": login_url,
            "region": region,
            "access_key": credentials.access_key_id,
            "secret_key": credentials.secret_access_key,
            "session_token": credentials.session_token,
            "expiration": credentials.expiration,
            "federated": true,
            "is_root": is_root,
        }))
    }
}

fn records<T: Serialize>(items: Vec<T>) -> AwsResult<Vec<Value>> {
    items
        .into_iter()
        .map(|item| serde_json::to_value(item).map_err(AwsError::from))
        .collect()
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Aws
    }

    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    async fn enumerate(&self, resource_type: &str) -> nimbus_cloud::Result<Inventory> {
        let services = CATALOG.services(resource_type)?;
        FanOut::new(self.region(), &AWS_REGIONS)
            .run(&services, |unit| async move {
                self.collect(&unit).await.map_err(|e| e.to_string())
            })
            .await
    }

    async fn escalate(&self) -> nimbus_cloud::Result<EscalationReport> {
        let api = self.home().await?;
        let identity = Identity::probe(api.as_ref()).await;

        Ok(EscalationReport::attempted()
            .with_identity(identity.user_name(), identity.user_type())
            .with_role("None")
            .with_permissions(PROBED_PERMISSIONS)
            .with_escalation_paths(ESCALATION_PATHS)
            .with_risk(RiskLevel::Medium)
            .with_actions(ESCALATION_CHECKS))
    }

    async fn operate(&self, request: &OperateRequest) -> nimbus_cloud::Result<Value> {
        if request.action == "federated_login" {
            return Ok(self.federated_login().await?);
        }

        let outcome = match (request.resource_type.as_str(), request.action.as_str()) {
            ("ec2", "execute_command") => self.execute_command(request).await,
            ("s3", "list_objects") => {
                let api = self.home().await?;
                let prefix = request.param_str("prefix").unwrap_or("");
                s3::list_objects_operation(
                    api.as_ref(),
                    self.connector.as_ref(),
                    &request.resource_id,
                    prefix,
                )
                .await
            }
            ("s3", "download") => {
                let api = self.home().await?;
                s3::download_operation(
                    api.as_ref(),
                    self.connector.as_ref(),
                    &request.resource_id,
                    request.param_str("key"),
                )
                .await
            }
            _ => return Ok(OperationAttempt::from_request(request).into_value()),
        };
        Ok(outcome?)
    }

    async fn takeover(&self) -> nimbus_cloud::Result<TakeoverReport> {
        Ok(TakeoverReport::attempted(Vec::<String>::new()))
    }

    async fn validate_credentials(&self) -> nimbus_cloud::Result<bool> {
        let api = self.home().await?;
        match within(DEFAULT_CALL_DEADLINE, "get caller identity", api.get_caller_identity()).await {
            Ok(identity) => {
                tracing::debug!(account = %identity.account, arn = %identity.arn, "credential valid");
                Ok(true)
            }
            Err(err) if is_auth_failure(&err.service_message()) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_permissions(&self) -> nimbus_cloud::Result<PermissionReport> {
        let api = self.home().await?;
        let identity = Identity::probe(api.as_ref()).await;

        let permissions = match &identity {
            Identity::IamUser(name) => match within(
                DEFAULT_CALL_DEADLINE,
                "list attached user policies",
                api.list_attached_user_policies(name),
            )
            .await
            {
                Ok(policies) => policies,
                Err(err) if is_access_denied(&err.service_message()) => {
                    vec!["Access Denied".to_string()]
                }
                Err(err) => {
                    tracing::debug!(error = %err, "attached policy listing failed");
                    Vec::new()
                }
            },
            Identity::Root => vec!["All Permissions".to_string()],
            Identity::Denied | Identity::Unknown => vec!["Unknown".to_string()],
        };

        Ok(PermissionReport::retrieved(permissions)
            .for_identity(identity.user_name(), identity.user_type()))
    }
}
