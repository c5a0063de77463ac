// src/services/encryption.rs
//! At-rest encryption for stored OAuth provider tokens

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Encryption key not configured")]
    KeyNotConfigured,

    #[error("Invalid encryption key format")]
    InvalidKeyFormat,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid encrypted data format")]
    InvalidDataFormat,
}

pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("cipher", &"<redacted>")
            .finish()
    }
}

impl EncryptionService {
    /// Initialize from the TOKEN_ENCRYPTION_KEY environment variable
    /// (base64-encoded 32-byte key). When absent, provider tokens are stored
    /// as-is and a warning is logged at startup.
    pub fn from_env() -> Result<Self, EncryptionError> {
        let key_str =
            env::var("TOKEN_ENCRYPTION_KEY").map_err(|_| EncryptionError::KeyNotConfigured)?;
        Self::from_key(&key_str)
    }

    pub fn from_key(key_str: &str) -> Result<Self, EncryptionError> {
        let key_bytes = BASE64
            .decode(key_str.as_bytes())
            .map_err(|_| EncryptionError::InvalidKeyFormat)?;

        // AES-256 requires exactly 32 bytes
        if key_bytes.len() != 32 {
            return Err(EncryptionError::InvalidKeyFormat);
        }

        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Generate a new random key (base64-encoded), for operator setup.
    pub fn generate_key() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Encrypt a provider token. Output is base64(nonce || ciphertext).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        let mut combined = Vec::with_capacity(12 + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, EncryptionError> {
        let combined = BASE64
            .decode(encoded.as_bytes())
            .map_err(|_| EncryptionError::InvalidDataFormat)?;

        if combined.len() < 12 {
            return Err(EncryptionError::InvalidDataFormat);
        }
        let (nonce_bytes, ciphertext) = combined.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|_| EncryptionError::InvalidDataFormat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let service = EncryptionService::from_key(&EncryptionService::generate_key()).unwrap();
        let token = "ya29.a0AfH6SMBx-provider-access-token";

        let sealed = service.encrypt(token).unwrap();
        assert_ne!(sealed, token);
        assert_eq!(service.decrypt(&sealed).unwrap(), token);
    }

    #[test]
    fn test_nonce_varies_per_encryption() {
        let service = EncryptionService::from_key(&EncryptionService::generate_key()).unwrap();
        let a = service.encrypt("tok").unwrap();
        let b = service.encrypt("tok").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let one = EncryptionService::from_key(&EncryptionService::generate_key()).unwrap();
        let two = EncryptionService::from_key(&EncryptionService::generate_key()).unwrap();

        let sealed = one.encrypt("secret").unwrap();
        assert!(two.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_rejects_short_key() {
        let short = BASE64.encode(b"too-short");
        assert!(matches!(
            EncryptionService::from_key(&short),
            Err(EncryptionError::InvalidKeyFormat)
        ));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let service = EncryptionService::from_key(&EncryptionService::generate_key()).unwrap();
        assert!(service.decrypt("AAAA").is_err());
    }
}
