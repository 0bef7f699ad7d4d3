//! Encryption at rest for credential secrets
//!
//! AES-256-GCM with a random 96-bit nonce per value. The stored form is
//! `base64(nonce || ciphertext)`.
//!
//! The key comes from `NIMBUS_SECRET_KEY`. Without it a key is derived from
//! the JWT secret (SHA-256), which keeps development setups working but
//! ties secret storage to token signing.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Nonce size for AES-256-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

/// Domain separator for keys derived from the JWT secret
const DERIVATION_CONTEXT: &[u8] = b"nimbus/credential-secret/v1:";

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Seals and opens credential secrets
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    pub fn new(key: &[u8; 32]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| SecretError::InvalidKey(format!("Failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Derive a key from another secret (the JWT signing secret)
    pub fn derived_from(secret: &str) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(DERIVATION_CONTEXT);
        hasher.update(secret.as_bytes());
        let key: [u8; 32] = hasher.finalize().into();
        Self::new(&key)
    }

    /// Configured key when present, derived key otherwise
    pub fn from_settings(settings: &nimbus_config::Settings) -> Result<Self> {
        match settings.secret_key {
            Some(key) => Self::new(&key),
            None => {
                tracing::warn!(
                    "NIMBUS_SECRET_KEY not set; deriving the credential key from JWT_SECRET"
                );
                Self::derived_from(&settings.jwt.secret)
            }
        }
    }

    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SecretError::EncryptionError(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);

        Ok(BASE64.encode(combined))
    }

    pub fn open(&self, sealed: &str) -> Result<String> {
        let combined = BASE64
            .decode(sealed)
            .map_err(|e| SecretError::DecryptionError(format!("Invalid base64: {}", e)))?;

        if combined.len() < NONCE_SIZE {
            return Err(SecretError::DecryptionError(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SecretError::DecryptionError(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| SecretError::DecryptionError(format!("Invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_seal_then_open() {
        let c = cipher();
        let sealed = c.seal("wJalrXUtnFEMI/K7MDENG").unwrap();
        assert!(!sealed.contains("wJalrXUtnFEMI"));
        assert_eq!(c.open(&sealed).unwrap(), "wJalrXUtnFEMI/K7MDENG");
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let c = cipher();
        assert_ne!(c.seal("same").unwrap(), c.seal("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = cipher().seal("secret").unwrap();
        let other = SecretCipher::new(&[8u8; 32]).unwrap();
        assert!(matches!(
            other.open(&sealed),
            Err(SecretError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_garbage_input() {
        let c = cipher();
        assert!(c.open("not base64!").is_err());
        assert!(c.open(&BASE64.encode([1u8; 4])).is_err());
    }

    #[test]
    fn test_derived_key_is_stable() {
        let a = SecretCipher::derived_from("jwt-secret").unwrap();
        let b = SecretCipher::derived_from("jwt-secret").unwrap();
        let sealed = a.seal("value").unwrap();
        assert_eq!(b.open(&sealed).unwrap(), "value");

        let c = SecretCipher::derived_from("other").unwrap();
        assert!(c.open(&sealed).is_err());
    }
}
