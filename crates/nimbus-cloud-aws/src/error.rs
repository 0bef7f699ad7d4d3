//! AWS provider error types

use nimbus_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("failed to {operation}: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("failed to load AWS config: {0}")]
    Config(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("failed to get signin token: {0}")]
    Signin(String),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl AwsError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        AwsError::Api {
            operation,
            message: message.into(),
        }
    }

    /// Raw service message, used for identity classification
    pub fn service_message(&self) -> String {
        match self {
            AwsError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::Cloud(inner) => inner,
            AwsError::Config(msg) => CloudError::SdkBootstrap(msg),
            AwsError::Timeout { .. } => CloudError::Timeout(err.to_string()),
            other => CloudError::Upstream(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Run an AWS call under a deadline
pub async fn within<T, F>(deadline: std::time::Duration, operation: &'static str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(outcome) => outcome,
        Err(_) => Err(AwsError::Timeout {
            operation,
            secs: deadline.as_secs(),
        }),
    }
}
