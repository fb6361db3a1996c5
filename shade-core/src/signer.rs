//! External signer boundary
//!
//! The master key mixes in a signature from the user's wallet over a fixed,
//! versioned message. Any wallet that produces deterministic signatures
//! (RFC 6979) can act as the second factor.

use crate::address::LedgerAddress;
use crate::crypto::{keccak256_concat, SECP};
use crate::{Error, Result};
use async_trait::async_trait;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{rand::rngs::OsRng, Message, PublicKey, SecretKey};
use shade_params::domain::SIGNING_MESSAGE_VERSION;
use zeroize::Zeroizing;

/// Length of a recoverable signature (`r || s || v`)
pub const SIGNATURE_LENGTH: usize = 65;

/// Message the external signer signs during initialization
pub fn signing_message(user_id: &str, auth_method: &str) -> String {
    format!(
        "Shade wallet key derivation\n\
         \n\
         Version: {}\n\
         User: {}\n\
         Auth method: {}\n\
         \n\
         Signing this message does not send a transaction or cost anything.",
        SIGNING_MESSAGE_VERSION, user_id, auth_method
    )
}

/// Wallet capability used as the second key-derivation factor
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// Ledger account the signer controls
    fn account(&self) -> LedgerAddress;

    /// Deterministic 65-byte signature over `message`
    async fn sign_message(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LENGTH]>;
}

/// EIP-191 personal-message hash
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    keccak256_concat(&[prefix.as_bytes(), message])
}

/// Sign a 32-byte digest, returning `r || s || v` with `v` in {27, 28}
pub fn sign_digest(secret: &[u8; 32], digest: &[u8; 32]) -> Result<[u8; SIGNATURE_LENGTH]> {
    let key = SecretKey::from_slice(secret).map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;
    let message = Message::from_slice(digest).map_err(|e| Error::Signer(e.to_string()))?;
    let (recovery_id, compact) = SECP
        .sign_ecdsa_recoverable(&message, &key)
        .serialize_compact();

    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(&compact);
    out[64] = 27 + recovery_id.to_i32() as u8;
    Ok(out)
}

/// Address that produced `signature` over `digest`
pub fn recover_digest_signer(digest: &[u8; 32], signature: &[u8]) -> Result<LedgerAddress> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(Error::InvalidLength {
            expected: SIGNATURE_LENGTH,
            actual: signature.len(),
        });
    }
    let v = match signature[64] {
        27 | 28 => signature[64] - 27,
        0 | 1 => signature[64],
        other => return Err(Error::Signer(format!("invalid recovery byte {}", other))),
    };
    let recovery_id =
        RecoveryId::from_i32(v as i32).map_err(|e| Error::Signer(e.to_string()))?;
    let sig = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| Error::Signer(e.to_string()))?;
    let message = Message::from_slice(digest).map_err(|e| Error::Signer(e.to_string()))?;
    let public = SECP
        .recover_ecdsa(&message, &sig)
        .map_err(|e| Error::Signer(e.to_string()))?;
    Ok(LedgerAddress::from_public_key(&public))
}

/// Address that produced a personal-message `signature`
pub fn recover_signer(message: &[u8], signature: &[u8]) -> Result<LedgerAddress> {
    recover_digest_signer(&personal_message_hash(message), signature)
}

/// In-process signer backed by a raw secp256k1 key
pub struct LocalSigner {
    secret: Zeroizing<[u8; 32]>,
    account: LedgerAddress,
}

impl LocalSigner {
    /// From a 32-byte private key
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let key =
            SecretKey::from_slice(secret).map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;
        let account = LedgerAddress::from_public_key(&PublicKey::from_secret_key(&SECP, &key));
        Ok(Self {
            secret: Zeroizing::new(key.secret_bytes()),
            account,
        })
    }

    /// From a hex private key, with or without `0x`
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let trimmed = hex_key.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(hex::decode(stripped)?);
        Self::from_bytes(&bytes)
    }

    /// Fresh random key
    pub fn random() -> Self {
        let key = SecretKey::new(&mut OsRng);
        let account = LedgerAddress::from_public_key(&PublicKey::from_secret_key(&SECP, &key));
        Self {
            secret: Zeroizing::new(key.secret_bytes()),
            account,
        }
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExternalSigner for LocalSigner {
    fn account(&self) -> LedgerAddress {
        self.account
    }

    async fn sign_message(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LENGTH]> {
        sign_digest(&self.secret, &personal_message_hash(message))
    }
}
