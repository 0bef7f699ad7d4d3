//! Password hashing and JWT session tokens

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ControlPlaneError, Result};
use crate::model::User;

const SALT_LEN: usize = 16;

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// Salted SHA-256, stored as `base64(salt)$base64(hash)`
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    format!(
        "{}${}",
        BASE64.encode(salt),
        BASE64.encode(digest(&salt, password))
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, hash)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (BASE64.decode(salt), BASE64.decode(hash)) else {
        return false;
    };
    let actual = digest(&salt, password);

    // constant time over the digest length
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// JWT claims payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub role: String,
    /// Expiration (unix timestamp)
    pub exp: i64,
    /// Issued at (unix timestamp)
    pub iat: i64,
    /// Not before (unix timestamp)
    pub nbf: i64,
}

/// Issues and validates HS256 tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, expiry_hours: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expiry: chrono::Duration::hours(expiry_hours as i64),
        }
    }

    pub fn from_settings(settings: &nimbus_config::JwtSettings) -> Self {
        Self::new(&settings.secret, settings.expiry_hours)
    }

    pub fn issue(&self, user: &User) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            user_id: user.id.clone(),
            username: user.username.clone(),
            role: user.role.clone(),
            exp: (now + self.expiry).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ControlPlaneError::Internal(format!("JWT encode failed: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                ControlPlaneError::Unauthorized("Invalid or expired token".to_string())
            })
    }
}
