//! Cloud provider trait definition

use crate::error::{CloudError, Result};
use crate::fanout::Inventory;
use crate::report::{EscalationReport, PermissionReport, TakeoverReport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloud provider abstraction trait
///
/// Every adapter (AWS, Aliyun, GCP, Azure) implements this trait so the
/// worker and the inline API path can drive heterogeneous clouds through the
/// same six operations. Adapters are built per request and never pooled.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider tag this adapter was built for
    fn tag(&self) -> ProviderTag;

    /// Region the adapter is pinned to, if any
    fn region(&self) -> Option<&str>;

    /// Enumerate resources of the given type (`"all"` for everything)
    async fn enumerate(&self, resource_type: &str) -> Result<Inventory>;

    /// Probe the identity behind the credential for escalation paths
    async fn escalate(&self) -> Result<EscalationReport>;

    /// Run a resource-specific action
    ///
    /// Unknown `(resource_type, action)` pairs answer with an
    /// [`OperationAttempt`](crate::report::OperationAttempt) descriptor
    /// instead of an error.
    async fn operate(&self, request: &OperateRequest) -> Result<serde_json::Value>;

    /// Attempt a platform takeover
    async fn takeover(&self) -> Result<TakeoverReport>;

    /// Check the credential against the provider
    async fn validate_credentials(&self) -> Result<bool>;

    /// Identity of the caller and the permissions observed for it
    async fn get_permissions(&self) -> Result<PermissionReport>;
}

/// Provider tags as stored on credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderTag {
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "阿里云")]
    Aliyun,
    #[serde(rename = "GCP")]
    Gcp,
    #[serde(rename = "Azure")]
    Azure,
    #[serde(rename = "腾讯云")]
    Tencent,
}

impl ProviderTag {
    pub const ALL: [ProviderTag; 5] = [
        ProviderTag::Aws,
        ProviderTag::Aliyun,
        ProviderTag::Gcp,
        ProviderTag::Azure,
        ProviderTag::Tencent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::Aws => "AWS",
            ProviderTag::Aliyun => "阿里云",
            ProviderTag::Gcp => "GCP",
            ProviderTag::Azure => "Azure",
            ProviderTag::Tencent => "腾讯云",
        }
    }
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderTag {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        ProviderTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| CloudError::UnsupportedProvider(s.to_string()))
    }
}

/// Raw credential material handed to an adapter constructor
#[derive(Clone)]
pub struct CloudCredentials {
    pub access_key: String,
    pub secret_key: String,
    /// Empty or `None` means "all regions"
    pub region: Option<String>,
}

impl CloudCredentials {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: Option<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.filter(|r| !r.is_empty()),
        }
    }

    /// Reject obviously unusable key material before touching any SDK
    pub fn ensure_present(&self) -> Result<()> {
        if self.access_key.trim().is_empty() {
            return Err(CloudError::InvalidCredentials(
                "access key is empty".to_string(),
            ));
        }
        if self.secret_key.trim().is_empty() {
            return Err(CloudError::InvalidCredentials(
                "secret key is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Input of [`CloudProvider::operate`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperateRequest {
    pub resource_type: String,
    pub action: String,
    pub resource_id: String,

    /// Full parameter bag, including the three keys above when it came from a task
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl OperateRequest {
    pub fn new(
        resource_type: impl Into<String>,
        action: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            action: action.into(),
            resource_id: resource_id.into(),
            params: serde_json::Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Get a string parameter, treating empty strings as absent
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Get a parameter as a specific type
    pub fn get_param<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.params
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,

    /// Initial delay between attempts
    pub initial_delay: Duration,

    /// Maximum delay between attempts
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Fixed delay between attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}
