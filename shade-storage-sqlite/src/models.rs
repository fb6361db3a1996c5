//! Vault models

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authenticated cipher used for a vault record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VaultAlgorithm {
    /// AES-256-GCM
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// ChaCha20-Poly1305
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl VaultAlgorithm {
    /// Byte tag bound into the associated data and stored with the record
    pub fn as_byte(&self) -> u8 {
        match self {
            VaultAlgorithm::Aes256Gcm => 0,
            VaultAlgorithm::ChaCha20Poly1305 => 1,
        }
    }

    /// Inverse of [`VaultAlgorithm::as_byte`]
    pub fn from_byte(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(VaultAlgorithm::Aes256Gcm),
            1 => Ok(VaultAlgorithm::ChaCha20Poly1305),
            other => Err(Error::Validation(format!("unknown vault algorithm {}", other))),
        }
    }
}

impl fmt::Display for VaultAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultAlgorithm::Aes256Gcm => write!(f, "aes-256-gcm"),
            VaultAlgorithm::ChaCha20Poly1305 => write!(f, "chacha20-poly1305"),
        }
    }
}

impl FromStr for VaultAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aes-256-gcm" | "aes" | "aesgcm" => Ok(VaultAlgorithm::Aes256Gcm),
            "chacha20-poly1305" | "chacha" | "chacha20" => Ok(VaultAlgorithm::ChaCha20Poly1305),
            other => Err(Error::Validation(format!("unknown vault algorithm '{}'", other))),
        }
    }
}

/// Who a vault record belongs to; bound into the ciphertext's associated data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultIdentity {
    /// Ledger account of the external signer (checksummed)
    pub account_id: String,
    /// Application-level user identifier
    pub user_id: String,
    /// Authentication method tag
    pub auth_method: String,
}

impl VaultIdentity {
    /// Construct
    pub fn new(
        account_id: impl Into<String>,
        user_id: impl Into<String>,
        auth_method: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            user_id: user_id.into(),
            auth_method: auth_method.into(),
        }
    }
}

/// Encrypted key set at rest. One per account.
///
/// Binary fields serialize as standard base64 so records stay text-safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Plaintext layout version
    pub version: u8,
    /// Cipher
    pub algorithm: VaultAlgorithm,
    /// Encrypted key material
    #[serde(with = "base64_field")]
    pub ciphertext: Vec<u8>,
    /// 12-byte nonce
    #[serde(with = "base64_field")]
    pub nonce: Vec<u8>,
    /// 16-byte authentication tag
    #[serde(with = "base64_field")]
    pub tag: Vec<u8>,
    /// Salt for the two-factor password hash
    #[serde(with = "base64_field")]
    pub master_salt: Vec<u8>,
    /// Salt for the password-only unlock key
    #[serde(with = "base64_field")]
    pub unlock_salt: Vec<u8>,
    /// Owner
    #[serde(flatten)]
    pub identity: VaultIdentity,
    /// Created timestamp (unix seconds)
    pub created_at: i64,
    /// Last re-encryption timestamp (unix seconds)
    pub updated_at: i64,
}

impl VaultRecord {
    /// Account this record belongs to
    pub fn account_id(&self) -> &str {
        &self.identity.account_id
    }
}

mod base64_field {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
