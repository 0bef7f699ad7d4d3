//! Azure provider implementation

use async_trait::async_trait;
use nimbus_cloud::{
    CloudCredentials, CloudProvider, EscalationReport, FanOut, Inventory, OperateRequest,
    OperationAttempt, PermissionReport, ProviderTag, ResourceCatalog, ServiceCall, TakeoverReport,
    Unit,
};
use serde_json::{Value, json};

const VIRTUAL_MACHINES: ServiceCall = ServiceCall::global("virtualMachines", "Compute");
// Storage accounts are account-wide, not regional.
const STORAGE_ACCOUNTS: ServiceCall = ServiceCall::global("storageAccounts", "Storage");
const ROLE_ASSIGNMENTS: ServiceCall = ServiceCall::global("roleAssignments", "Authorization");

/// `compute | storage | iam | all`
pub const CATALOG: ResourceCatalog = ResourceCatalog::new(&[
    ("compute", &[VIRTUAL_MACHINES]),
    ("storage", &[STORAGE_ACCOUNTS]),
    ("iam", &[ROLE_ASSIGNMENTS]),
]);

/// Azure provider
///
/// The access key doubles as tenant and client id, the secret key is the
/// client secret.
pub struct AzureProvider {
    credentials: CloudCredentials,
}

impl AzureProvider {
    pub fn new(credentials: CloudCredentials) -> nimbus_cloud::Result<Self> {
        credentials.ensure_present()?;
        Ok(Self { credentials })
    }

    fn sample(&self, unit: &Unit) -> Vec<Value> {
        match unit.service.key {
            "virtualMachines" => vec![json!({
                "vmName": "my-vm",
                "vmId": "12345678-1234-1234-1234-123456789012",
                "status": "Running",
                "publicIp": "52.123.45.67",
                "privateIp": "10.0.0.4",
                "size": "Standard_B2s"
            })],
            "storageAccounts" => vec![json!({
                "accountName": "mystorageaccount",
                "accountId": "12345678-1234-1234-1234-123456789012",
                "location": self.credentials.region.clone().unwrap_or_default(),
                "sku": "Standard_LRS"
            })],
            "roleAssignments" => vec![json!({
                "assignmentId": "12345678-1234-1234-1234-123456789012",
                "roleDefinitionId": "b24988ac-6180-42a0-ab88-20f7382dd24c",
                "principalId": "12345678-1234-1234-1234-123456789012"
            })],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Azure
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
        Ok(EscalationReport::attempted().with_actions([
            "Checked role assignments",
            "Checked VM managed identities",
            "Checked storage account keys",
        ]))
    }

    async fn operate(&self, request: &OperateRequest) -> nimbus_cloud::Result<Value> {
        Ok(OperationAttempt::from_request(request).into_value())
    }

    async fn takeover(&self) -> nimbus_cloud::Result<TakeoverReport> {
        Ok(TakeoverReport::attempted([
            "Created service principal with owner privileges",
            "Created storage account for persistence",
            "Configured backdoor access",
        ]))
    }

    async fn validate_credentials(&self) -> nimbus_cloud::Result<bool> {
        Ok(true)
    }

    async fn get_permissions(&self) -> nimbus_cloud::Result<PermissionReport> {
        Ok(PermissionReport::retrieved([
            "Microsoft.Compute/virtualMachines/read",
            "Microsoft.Storage/storageAccounts/read",
            "Microsoft.Authorization/roleAssignments/read",
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_uses_azure_keys() {
        let provider = AzureProvider::new(CloudCredentials::new("tenant", "secret", None)).unwrap();
        let inventory = tokio_test::block_on(provider.enumerate("all")).unwrap();
        assert_eq!(inventory.records("virtualMachines").len(), 1);
        assert_eq!(inventory.records("storageAccounts")[0]["location"], "");
        assert_eq!(inventory.records("roleAssignments").len(), 1);
    }

    #[test]
    fn test_escalate_is_minimal_descriptor() {
        let provider = AzureProvider::new(CloudCredentials::new("tenant", "secret", None)).unwrap();
        let value = serde_json::to_value(tokio_test::block_on(provider.escalate()).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "message": "Privilege escalation attempted",
                "actions": [
                    "Checked role assignments",
                    "Checked VM managed identities",
                    "Checked storage account keys"
                ]
            })
        );
    }
}
