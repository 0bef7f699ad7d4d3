//! Descriptor types returned by escalate / takeover / operate

use crate::provider::OperateRequest;
use serde::{Deserialize, Serialize};

/// Risk rating attached to an escalation probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
            RiskLevel::Critical => write!(f, "Critical"),
        }
    }
}

/// Result of an escalation probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationReport {
    /// Identity the probe ran as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Permissions observed for the identity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub potential_escalation: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,

    pub message: String,

    /// Checks the probe performed
    #[serde(default)]
    pub actions: Vec<String>,
}

impl EscalationReport {
    pub const ATTEMPTED: &'static str = "Privilege escalation attempted";

    pub fn attempted() -> Self {
        Self {
            user: None,
            user_type: None,
            role: None,
            permissions: Vec::new(),
            potential_escalation: Vec::new(),
            risk_level: None,
            message: Self::ATTEMPTED.to_string(),
            actions: Vec::new(),
        }
    }

    pub fn with_identity(mut self, user: impl Into<String>, user_type: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.user_type = Some(user_type.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = Some(risk);
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_escalation_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.potential_escalation = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of a takeover attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeoverReport {
    pub message: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

impl TakeoverReport {
    pub const ATTEMPTED: &'static str = "Cloud platform takeover attempted";

    pub fn attempted<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            message: Self::ATTEMPTED.to_string(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Identity and permissions observed for a credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionReport {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    pub permissions: Vec<String>,
}

impl PermissionReport {
    pub fn retrieved<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            message: "Permissions retrieved".to_string(),
            user_type: None,
            user_name: None,
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn for_identity(mut self, user_name: impl Into<String>, user_type: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self.user_type = Some(user_type.into());
        self
    }
}

/// Uniform answer for operations an adapter does not implement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationAttempt {
    pub message: String,
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub action: String,
    #[serde(rename = "resourceID")]
    pub resource_id: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl OperationAttempt {
    pub fn from_request(request: &OperateRequest) -> Self {
        Self {
            message: "Resource operation attempted".to_string(),
            resource_type: request.resource_type.clone(),
            action: request.action.clone(),
            resource_id: request.resource_id.clone(),
            params: request.params.clone(),
        }
    }

    pub fn into_value(self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escalation_report_uses_camel_case() {
        let report = EscalationReport::attempted()
            .with_identity("alice", "IAM User")
            .with_role("None")
            .with_risk(RiskLevel::Medium)
            .with_escalation_paths(["Modify existing IAM policies"])
            .with_actions(["Checked IAM policies"]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["userType"], "IAM User");
        assert_eq!(value["riskLevel"], "Medium");
        assert_eq!(value["potentialEscalation"][0], "Modify existing IAM policies");
        assert_eq!(value["message"], "Privilege escalation attempted");
        assert!(value.get("permissions").is_none());
    }

    #[test]
    fn test_operation_attempt_echoes_request() {
        let req = OperateRequest::new("vm", "stop", "vm-1").with_param("force", json!(true));
        let value = OperationAttempt::from_request(&req).into_value();
        assert_eq!(
            value,
            json!({
                "message": "Resource operation attempted",
                "resourceType": "vm",
                "action": "stop",
                "resourceID": "vm-1",
                "params": {"force": true}
            })
        );
    }

    #[test]
    fn test_takeover_report_without_actions() {
        let value = serde_json::to_value(TakeoverReport::attempted(Vec::<String>::new())).unwrap();
        assert_eq!(value, json!({"message": "Cloud platform takeover attempted"}));
    }
}
