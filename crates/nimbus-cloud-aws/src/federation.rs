//! Console federation
//!
//! `GetFederationToken` credentials are exchanged for a sign-in token at the
//! federation endpoint, which is then embedded in a console login URL.

use crate::error::{AwsError, Result};
use crate::model::FederationCredentials;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

pub const FEDERATION_ENDPOINT: &str = "https://signin.aws.amazon.com/federation";
pub const CONSOLE_DESTINATION: &str = "https://console.aws.amazon.com/";
pub const FEDERATION_ISSUER: &str = "aws_federal_login";
pub const FEDERATED_USER_NAME: &str = "federated-user";
pub const FEDERATION_DURATION: Duration = Duration::from_secs(3600);

/// Inline session policy granting everything
pub const ADMIN_POLICY: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Effect": "Allow",
      "Action": "*",
      "Resource": "*"
    }
  ]
}"#;

/// `Session` parameter of the sign-in token request
pub fn session_json(credentials: &FederationCredentials) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({
        "sessionId": credentials.access_key_id,
        "sessionKey": credentials.secret_access_key,
        "sessionToken": credentials.session_token,
    }))?)
}

pub fn signin_token_url(credentials: &FederationCredentials) -> Result<Url> {
    let session = session_json(credentials)?;
    Url::parse_with_params(
        FEDERATION_ENDPOINT,
        &[("Action", "getSigninToken"), ("Session", session.as_str())],
    )
    .map_err(|e| AwsError::Url(e.to_string()))
}

/// Console URL for a sign-in token
pub fn login_url(signin_token: &str) -> Result<String> {
    let url = Url::parse_with_params(
        FEDERATION_ENDPOINT,
        &[
            ("Action", "login"),
            ("Issuer", FEDERATION_ISSUER),
            ("Destination", CONSOLE_DESTINATION),
            ("SigninToken", signin_token),
        ],
    )
    .map_err(|e| AwsError::Url(e.to_string()))?;
    Ok(url.to_string())
}

#[derive(Deserialize)]
struct SigninTokenResponse {
    #[serde(rename = "SigninToken")]
    signin_token: Option<String>,
}

/// Ask the federation endpoint for a sign-in token
pub async fn fetch_signin_token(
    http: &reqwest::Client,
    credentials: &FederationCredentials,
) -> Result<String> {
    let url = signin_token_url(credentials)?;
    let response = http.get(url).send().await?.error_for_status()?;
    let body: SigninTokenResponse = response.json().await?;
    body.signin_token
        .ok_or_else(|| AwsError::Signin("SigninToken not found in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> FederationCredentials {
        FederationCredentials {
            access_key_id: "ASIA1".into(),
            secret_access_key: "secret/with+chars".into(),
            session_token: "token".into(),
            expiration: "2030-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_login_url_escapes_destination() {
        let url = login_url("abc123").unwrap();
        assert_eq!(
            url,
            "https://signin.aws.amazon.com/federation?Action=login&Issuer=aws_federal_login&Destination=https%3A%2F%2Fconsole.aws.amazon.com%2F&SigninToken=abc123"
        );
    }

    #[test]
    fn test_signin_request_carries_session_json() {
        let url = signin_token_url(&credentials()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("Action".into(), "getSigninToken".into()));
        let session: serde_json::Value = serde_json::from_str(&pairs[1].1).unwrap();
        assert_eq!(session["sessionId"], "ASIA1");
        assert_eq!(session["sessionKey"], "secret/with+chars");
        assert_eq!(session["sessionToken"], "token");
    }
}
