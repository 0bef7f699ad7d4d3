//! Control plane error types

use crate::db::DatabaseError;
use crate::secrets::SecretError;
use nimbus_cloud::CloudError;
use thiserror::Error;

/// Typed failures of the task execution core
///
/// The HTTP layer maps these to status codes; nothing in here knows about
/// transports.
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("Unsupported task type: {0}")]
    UnsupportedTaskType(String),

    #[error("Failed to create cloud provider: {0}")]
    AdapterInit(String),

    #[error("{0}")]
    Upstream(String),

    /// Informational; callers log it and carry on
    #[error("Task queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cloud error: {0}")]
    Cloud(CloudError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<CloudError> for ControlPlaneError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::UnsupportedProvider(tag) => ControlPlaneError::UnsupportedProvider(tag),
            CloudError::UnsupportedResourceType(kind) => {
                ControlPlaneError::UnsupportedResourceType(kind)
            }
            CloudError::InvalidCredentials(msg) | CloudError::SdkBootstrap(msg) => {
                ControlPlaneError::AdapterInit(msg)
            }
            CloudError::BadParam(msg) => ControlPlaneError::BadRequest(msg),
            CloudError::NotFound(msg) => ControlPlaneError::NotFound(msg),
            CloudError::Upstream(msg) => ControlPlaneError::Upstream(msg),
            other => ControlPlaneError::Cloud(other),
        }
    }
}

impl ControlPlaneError {
    pub fn not_found(what: &str) -> Self {
        ControlPlaneError::NotFound(format!("{} not found", what))
    }
}

pub type Result<T> = std::result::Result<T, ControlPlaneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_errors_keep_their_kind() {
        let err: ControlPlaneError = CloudError::UnsupportedProvider("Oracle".into()).into();
        assert!(matches!(err, ControlPlaneError::UnsupportedProvider(ref t) if t == "Oracle"));

        let err: ControlPlaneError = CloudError::InvalidCredentials("access key is empty".into()).into();
        assert_eq!(
            err.to_string(),
            "Failed to create cloud provider: access key is empty"
        );

        let err: ControlPlaneError = CloudError::BadParam("key is required".into()).into();
        assert!(matches!(err, ControlPlaneError::BadRequest(_)));

        let err: ControlPlaneError = CloudError::Timeout("EC2 (us-east-1)".into()).into();
        assert!(matches!(err, ControlPlaneError::Cloud(CloudError::Timeout(_))));
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(
            ControlPlaneError::not_found("Credential").to_string(),
            "Credential not found"
        );
    }
}
