//! Domain types shared by the store, worker and services

use crate::error::{ControlPlaneError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// Registered operator
///
/// The password hash never leaves the store layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Cloud credential owned by one user
///
/// `sealed_secret` is the encrypted secret key exactly as stored; it is
/// skipped by serde so no response body can carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "cloud_provider")]
    pub provider: String,
    pub access_key: String,
    #[serde(skip)]
    pub sealed_secret: String,
    pub region: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Task lifecycle
///
/// ```text
/// pending ──► running ──► completed
///    │           │
///    └───────────┴──────► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// States a task may be in right before entering `self`
    pub fn predecessors(&self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Pending => &[],
            TaskStatus::Running => &[TaskStatus::Pending],
            TaskStatus::Completed => &[TaskStatus::Running],
            TaskStatus::Failed => &[TaskStatus::Pending, TaskStatus::Running],
        }
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ControlPlaneError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(ControlPlaneError::BadRequest(format!(
                "unknown task status: {}",
                other
            ))),
        }
    }
}

/// Adapter operation a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Enumerate,
    Escalate,
    Operate,
    Takeover,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Enumerate => "enumerate",
            TaskType::Escalate => "escalate",
            TaskType::Operate => "operate",
            TaskType::Takeover => "takeover",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ControlPlaneError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "enumerate" => Ok(TaskType::Enumerate),
            "escalate" => Ok(TaskType::Escalate),
            "operate" => Ok(TaskType::Operate),
            "takeover" => Ok(TaskType::Takeover),
            other => Err(ControlPlaneError::UnsupportedTaskType(other.to_string())),
        }
    }
}

/// Durable record of one adapter invocation
///
/// `task_type` keeps whatever the caller submitted; an unknown type is only
/// rejected when the worker dispatches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub credential_id: String,
    pub name: String,
    pub task_type: String,
    pub status: TaskStatus,
    /// Opaque JSON text, stored byte for byte as submitted
    pub parameters: String,
    pub start_time: String,
    pub end_time: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    pub fn kind(&self) -> Result<TaskType> {
        self.task_type.parse()
    }
}

/// Payload or failure attached to a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub id: String,
    pub task_id: String,
    /// Serialized payload; empty for failures
    pub result: String,
    /// Empty on success
    pub error: String,
    pub timestamp: String,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    pub fn payload(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.result)?)
    }
}

/// How a processed task ends
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(serde_json::Value),
    Failed(String),
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed(_) => TaskStatus::Completed,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_graph() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Pending));
    }

    #[test]
    fn test_task_type_parsing() {
        assert_eq!("operate".parse::<TaskType>().unwrap(), TaskType::Operate);
        assert!(matches!(
            "exfil".parse::<TaskType>(),
            Err(ControlPlaneError::UnsupportedTaskType(t)) if t == "exfil"
        ));
    }

    #[test]
    fn test_credential_serialization_hides_secret() {
        let cred = Credential {
            id: "c1".into(),
            user_id: "u1".into(),
            provider: "AWS".into(),
            access_key: "AKIA".into(),
            sealed_secret: "sealed-bytes".into(),
            region: String::new(),
            name: "prod".into(),
            description: String::new(),
            created_at: "t".into(),
            updated_at: "t".into(),
        };
        let json = serde_json::to_value(&cred).unwrap();
        assert_eq!(json["cloud_provider"], "AWS");
        assert!(json.get("sealed_secret").is_none());
        assert!(json.get("secret_key").is_none());
        assert!(!json.to_string().contains("sealed-bytes"));
    }

    #[test]
    fn test_task_serializes_camel_case() {
        let task = Task {
            id: "t1".into(),
            user_id: "u1".into(),
            credential_id: "c1".into(),
            name: "scan".into(),
            task_type: "enumerate".into(),
            status: TaskStatus::Running,
            parameters: r#"{"resource_type":"ec2"}"#.into(),
            start_time: "s".into(),
            end_time: String::new(),
            created_at: "c".into(),
            updated_at: "u".into(),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["credentialId"], "c1");
        assert_eq!(json["taskType"], "enumerate");
        assert_eq!(json["status"], "running");
        assert_eq!(json["parameters"], r#"{"resource_type":"ec2"}"#);
    }
}
