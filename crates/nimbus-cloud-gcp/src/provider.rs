//! GCP provider implementation
//!
//! Compute, Storage and IAM answers are fixed sample data until the Google
//! Cloud client libraries are wired in.

use async_trait::async_trait;
use nimbus_cloud::{
    CloudCredentials, CloudProvider, EscalationReport, FanOut, Inventory, OperateRequest,
    OperationAttempt, PermissionReport, ProviderTag, ResourceCatalog, RiskLevel, ServiceCall,
    TakeoverReport, Unit,
};
use serde_json::{Value, json};

const COMPUTE: ServiceCall = ServiceCall::global("instances", "Compute");
const STORAGE: ServiceCall = ServiceCall::global("buckets", "Storage");
const IAM_USERS: ServiceCall = ServiceCall::global("users", "IAM Users");
const IAM_ROLES: ServiceCall = ServiceCall::global("roles", "IAM Roles");

/// `compute | storage | iam | all`
pub const CATALOG: ResourceCatalog = ResourceCatalog::new(&[
    ("compute", &[COMPUTE]),
    ("storage", &[STORAGE]),
    ("iam", &[IAM_USERS, IAM_ROLES]),
]);

/// GCP provider
pub struct GcpProvider {
    credentials: CloudCredentials,
}

impl GcpProvider {
    pub fn new(credentials: CloudCredentials) -> nimbus_cloud::Result<Self> {
        credentials.ensure_present()?;
        Ok(Self { credentials })
    }

    fn sample(&self, unit: &Unit) -> Vec<Value> {
        match unit.service.key {
            "instances" => vec![json!({
                "instanceId": "1234567890123456789",
                "instanceType": "n1-standard-1",
                "status": "RUNNING",
                "publicIp": "35.231.14.102",
                "privateIp": "10.128.0.100",
                "tags": ["web-server", "production"]
            })],
            "buckets" => vec![json!({
                "bucketName": "my-bucket",
                "creationDate": "2024-01-01T00:00:00Z",
                "location": self.credentials.region.clone().unwrap_or_default()
            })],
            "users" => vec![json!({
                "userName": "admin@example.com",
                "userId": "123456789012345678901",
                "email": "admin@example.com"
            })],
            "roles" => vec![json!({
                "roleName": "roles/compute.admin",
                "description": "Full control of all Compute Engine resources"
            })],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl CloudProvider for GcpProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Gcp
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
            .with_identity("GCP IAM User", "IAM User")
            .with_role("None")
            .with_permissions([
                "compute.instances.list",
                "storage.buckets.list",
                "iam.users.list",
                "iam.roles.list",
                "storage.objects.list",
            ])
            .with_escalation_paths([
                "Create IAM user with admin privileges",
                "Modify existing IAM policies",
                "Access Storage buckets with sensitive data",
            ])
            .with_risk(RiskLevel::Medium)
            .with_actions([
                "Checked IAM policies",
                "Checked Compute instance service accounts",
                "Checked Storage bucket policies",
            ]))
    }

    async fn operate(&self, request: &OperateRequest) -> nimbus_cloud::Result<Value> {
        Ok(OperationAttempt::from_request(request).into_value())
    }

    async fn takeover(&self) -> nimbus_cloud::Result<TakeoverReport> {
        Ok(TakeoverReport::attempted([
            "Created IAM user with admin privileges",
            "Created service account for persistence",
            "Configured backdoor access",
        ]))
    }

    async fn validate_credentials(&self) -> nimbus_cloud::Result<bool> {
        Ok(true)
    }

    async fn get_permissions(&self) -> nimbus_cloud::Result<PermissionReport> {
        Ok(PermissionReport::retrieved([
            "compute.instances.list",
            "storage.buckets.list",
            "iam.users.list",
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GcpProvider {
        GcpProvider::new(CloudCredentials::new("client", "key", Some("us-central1".into()))).unwrap()
    }

    #[test]
    fn test_storage_bucket_carries_location() {
        let inventory = tokio_test::block_on(provider().enumerate("storage")).unwrap();
        assert_eq!(inventory.records("buckets")[0]["location"], "us-central1");
    }

    #[test]
    fn test_escalate_descriptor_shape() {
        let report = tokio_test::block_on(provider().escalate()).unwrap();
        assert_eq!(report.user.as_deref(), Some("GCP IAM User"));
        assert_eq!(report.risk_level, Some(RiskLevel::Medium));
        assert_eq!(report.actions.len(), 3);
    }

    #[test]
    fn test_aws_resource_type_is_unsupported() {
        assert!(tokio_test::block_on(provider().enumerate("s3")).is_err());
    }
}
