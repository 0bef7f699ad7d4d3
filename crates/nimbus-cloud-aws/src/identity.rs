//! Who is behind a credential

use crate::client::AwsApi;
use crate::error::{AwsError, within};
use nimbus_cloud::DEFAULT_CALL_DEADLINE;

const ROOT_ARN_MARKER: &str = "User: arn:aws:iam::";
const ROOT_NOT_FOUND_MARKER: &str = ":root is not found";

/// Identity derived from `GetUser`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    IamUser(String),
    Root,
    /// `GetUser` was denied
    Denied,
    Unknown,
}

impl Identity {
    /// Run `GetUser` and classify the outcome
    pub async fn probe(api: &dyn AwsApi) -> Self {
        let outcome = within(DEFAULT_CALL_DEADLINE, "get user", api.get_current_user()).await;
        Self::classify(outcome)
    }

    pub fn classify(outcome: Result<String, AwsError>) -> Self {
        match outcome {
            Ok(name) => Identity::IamUser(name),
            Err(err) => {
                let message = err.service_message();
                if is_root_marker(&message) {
                    Identity::Root
                } else if is_access_denied(&message) {
                    Identity::Denied
                } else {
                    tracing::debug!(error = %message, "caller identity unresolved");
                    Identity::Unknown
                }
            }
        }
    }

    pub fn user_type(&self) -> &'static str {
        match self {
            Identity::IamUser(_) => "IAM User",
            Identity::Root => "Root User",
            Identity::Denied | Identity::Unknown => "Unknown",
        }
    }

    pub fn user_name(&self) -> &str {
        match self {
            Identity::IamUser(name) => name,
            Identity::Root => "root",
            Identity::Denied => "Unknown (Access Denied)",
            Identity::Unknown => "Unknown",
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Identity::Root)
    }
}

/// Root credentials cannot call `GetUser` on themselves
pub fn is_root_marker(message: &str) -> bool {
    message.contains(ROOT_ARN_MARKER) && message.contains(ROOT_NOT_FOUND_MARKER)
}

pub fn is_access_denied(message: &str) -> bool {
    message.contains("AccessDenied")
}

/// Rejections that mean the key pair itself is bad
pub fn is_auth_failure(message: &str) -> bool {
    [
        "InvalidClientTokenId",
        "SignatureDoesNotMatch",
        "UnrecognizedClientException",
        "AuthFailure",
        "ExpiredToken",
    ]
    .iter()
    .any(|code| message.contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_detected_from_error_text() {
        let err = AwsError::api(
            "get user",
            "ValidationError: User: arn:aws:iam::123456789012:root is not found",
        );
        let identity = Identity::classify(Err(err));
        assert_eq!(identity, Identity::Root);
        assert_eq!(identity.user_type(), "Root User");
        assert_eq!(identity.user_name(), "root");
    }

    #[test]
    fn test_access_denied_is_unknown() {
        let err = AwsError::api("get user", "AccessDenied: not authorized to perform iam:GetUser");
        let identity = Identity::classify(Err(err));
        assert_eq!(identity.user_type(), "Unknown");
        assert_eq!(identity.user_name(), "Unknown (Access Denied)");
    }

    #[test]
    fn test_iam_user_keeps_name() {
        let identity = Identity::classify(Ok("alice".into()));
        assert_eq!(identity.user_type(), "IAM User");
        assert_eq!(identity.user_name(), "alice");
        assert!(!identity.is_root());
    }

    #[test]
    fn test_auth_failure_codes() {
        assert!(is_auth_failure("InvalidClientTokenId: The security token is invalid"));
        assert!(!is_auth_failure("Throttling: Rate exceeded"));
    }
}
