//! Field-level encryption for values stored at rest.
//!
//! Values are sealed with AES-256-GCM under a random nonce, so equal
//! plaintexts produce different ciphertexts. Lookups go through a keyed
//! blind index (HMAC-SHA256) instead of comparing ciphertexts.

use crate::error::{PaymentError, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;
const PREFIX: &str = "enc:v1:";
const INDEX_CONTEXT: &[u8] = b"settlepay/blind-index";

type HmacSha256 = Hmac<Sha256>;

pub struct FieldCipher {
    key: [u8; 32],
    index_key: [u8; 32],
}

impl FieldCipher {
    pub fn new(key: [u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(INDEX_CONTEXT);
        hasher.update(key);
        Self {
            key,
            index_key: hasher.finalize().into(),
        }
    }

    /// Parses a 256-bit key written as 64 hex characters.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| PaymentError::CryptoError(format!("Encryption key is not hex: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            PaymentError::CryptoError(format!(
                "Encryption key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::new(key))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| PaymentError::CryptoError(format!("Cipher init failed: {e}")))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| PaymentError::CryptoError(format!("Encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(format!("{PREFIX}{}", STANDARD.encode(combined)))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String> {
        let encoded = sealed
            .strip_prefix(PREFIX)
            .ok_or_else(|| PaymentError::CryptoError("Missing ciphertext prefix".to_string()))?;
        let combined = STANDARD
            .decode(encoded)
            .map_err(|e| PaymentError::CryptoError(format!("Invalid base64: {e}")))?;
        if combined.len() < NONCE_LEN {
            return Err(PaymentError::CryptoError("Ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| PaymentError::CryptoError(format!("Cipher init failed: {e}")))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| PaymentError::CryptoError(format!("Decryption failed: {e}")))?;
        String::from_utf8(plaintext)
            .map_err(|e| PaymentError::CryptoError(format!("Invalid UTF-8: {e}")))
    }

    /// Deterministic keyed digest used as a lookup key.
    pub fn blind_index(&self, value: &str) -> Result<[u8; 32]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.index_key)
            .map_err(|e| PaymentError::CryptoError(format!("HMAC init failed: {e}")))?;
        mac.update(value.as_bytes());
        Ok(mac.finalize().into_bytes().into())
    }
}
