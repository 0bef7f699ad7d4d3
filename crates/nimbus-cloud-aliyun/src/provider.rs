//! Aliyun provider implementation
//!
//! The ECS/OSS/RAM calls are not wired to the Aliyun SDK yet. The adapter
//! answers with a fixed sample inventory, routed through the same fan-out
//! engine as the real adapters so callers see identical shapes.

use async_trait::async_trait;
use nimbus_cloud::{
    CloudCredentials, CloudProvider, EscalationReport, FanOut, Inventory, OperateRequest,
    OperationAttempt, PermissionReport, ProviderTag, ResourceCatalog, RiskLevel, ServiceCall,
    TakeoverReport, Unit,
};
use serde_json::{Value, json};

const ECS: ServiceCall = ServiceCall::global("instances", "ECS");
const OSS: ServiceCall = ServiceCall::global("buckets", "OSS");
const RAM_USERS: ServiceCall = ServiceCall::global("users", "RAM Users");
const RAM_ROLES: ServiceCall = ServiceCall::global("roles", "RAM Roles");

/// `ecs | oss | ram | all`
pub const CATALOG: ResourceCatalog = ResourceCatalog::new(&[
    ("ecs", &[ECS]),
    ("oss", &[OSS]),
    ("ram", &[RAM_USERS, RAM_ROLES]),
]);

/// Aliyun provider
pub struct AliyunProvider {
    credentials: CloudCredentials,
}

impl AliyunProvider {
    pub fn new(credentials: CloudCredentials) -> nimbus_cloud::Result<Self> {
        credentials.ensure_present()?;
        tracing::debug!(region = ?credentials.region, "aliyun adapter ready");
        Ok(Self { credentials })
    }

    fn region_label(&self) -> String {
        self.credentials.region.clone().unwrap_or_default()
    }

    fn sample(&self, unit: &Unit) -> Vec<Value> {
        match unit.service.key {
            "instances" => vec![json!({
                "instanceId": "i-1234567890abcdef0",
                "instanceType": "ecs.t5-lc2m1.nano",
                "status": "Running",
                "publicIp": "47.96.123.45",
                "privateIp": "172.16.0.100",
                "tags": {"Name": "Web Server"}
            })],
            "buckets" => vec![json!({
                "bucketName": "my-bucket",
                "creationDate": "2024-01-01T00:00:00Z",
                "region": self.region_label()
            })],
            "users" => vec![json!({
                "userName": "admin",
                "userId": "1234567890",
                "arn": "acs:ram::1234567890:user/admin"
            })],
            "roles" => vec![json!({
                "roleName": "ECSRole",
                "roleId": "1234567890",
                "arn": "acs:ram::1234567890:role/ECSRole"
            })],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl CloudProvider for AliyunProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Aliyun
    }

    fn region(&self) -> Option<&str> {
        self.credentials.region.as_deref()
    }

    async fn enumerate(&self, resource_type: &str) -> nimbus_cloud::Result<Inventory> {
        let services = CATALOG.services(resource_type)?;
        FanOut::new(self.region(), &[])
            .run(&services, |unit| {
                let records = self.sample(&unit);
                async move { Ok::<_, String>(records) }
            })
            .await
    }

    async fn escalate(&self) -> nimbus_cloud::Result<EscalationReport> {
        Ok(EscalationReport::attempted()
            .with_identity("Aliyun RAM User", "RAM User")
            .with_role("None")
            .with_permissions([
                "ecs:DescribeInstances",
                "oss:ListBuckets",
                "ram:ListUsers",
                "ram:ListRoles",
                "oss:GetBucketLocation",
                "oss:ListObjects",
            ])
            .with_escalation_paths([
                "Create RAM user with admin privileges",
                "Modify existing RAM policies",
                "Access OSS buckets with sensitive data",
            ])
            .with_risk(RiskLevel::Medium)
            .with_actions([
                "Checked RAM policies",
                "Checked ECS instance roles",
                "Checked OSS bucket policies",
            ]))
    }

    async fn operate(&self, request: &OperateRequest) -> nimbus_cloud::Result<Value> {
        Ok(OperationAttempt::from_request(request).into_value())
    }

    async fn takeover(&self) -> nimbus_cloud::Result<TakeoverReport> {
        Ok(TakeoverReport::attempted([
            "Created RAM user with admin privileges",
            "Created access keys for persistence",
            "Configured backdoor access",
        ]))
    }

    async fn validate_credentials(&self) -> nimbus_cloud::Result<bool> {
        Ok(true)
    }

    async fn get_permissions(&self) -> nimbus_cloud::Result<PermissionReport> {
        Ok(PermissionReport::retrieved([
            "ecs:DescribeInstances",
            "oss:ListBuckets",
            "ram:ListUsers",
        ]))
    }
}
