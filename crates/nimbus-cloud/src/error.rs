//! Cloud provider error types

use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("SDK bootstrap failed: {0}")]
    SdkBootstrap(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("failed to enumerate any resources: {0}")]
    NoResults(String),

    #[error("{0}")]
    BadParam(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    StateMismatch(String),

    #[error("{0}")]
    Upstream(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
