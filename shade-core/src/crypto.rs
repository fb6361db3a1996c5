//! Primitive crypto layer
//!
//! Argon2id password hashing, HKDF-SHA256 extract-and-expand, Keccak-256,
//! salt generation and constant-time comparison. Everything above this
//! module goes through these functions instead of touching the primitives.

use crate::{Error, Result};
use argon2::{Algorithm, Argon2, ParamsBuilder, Version};
use hkdf::Hkdf;
use once_cell::sync::Lazy;
use rand::{rngs::OsRng, RngCore};
use secp256k1::{All, Secp256k1};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use shade_params::domain::MIN_SALT_LENGTH;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Shared secp256k1 context (signing and verification)
pub(crate) static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl KdfConfig {
    /// 64 MiB, 3 passes, 4 lanes
    pub const DEFAULT: KdfConfig = KdfConfig {
        memory_kib: 65_536,
        iterations: 3,
        parallelism: 4,
    };

    /// Minimal cost, for tests only
    pub const INSECURE_FAST: KdfConfig = KdfConfig {
        memory_kib: 1_024,
        iterations: 1,
        parallelism: 1,
    };

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = ParamsBuilder::new()
            .m_cost(self.memory_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .output_len(32)
            .build()
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Memory-hard password hash (Argon2id, 32-byte output)
pub fn hash_password(
    password: &str,
    salt: &[u8],
    config: &KdfConfig,
) -> Result<Zeroizing<[u8; 32]>> {
    if salt.len() < MIN_SALT_LENGTH {
        return Err(Error::InvalidSalt(format!(
            "salt must be at least {} bytes, got {}",
            MIN_SALT_LENGTH,
            salt.len()
        )));
    }
    if password.is_empty() {
        return Err(Error::InvalidPassword);
    }

    let mut out = Zeroizing::new([0u8; 32]);
    config
        .argon2()?
        .hash_password_into(password.as_bytes(), salt, &mut *out)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

    Ok(out)
}

/// HKDF-SHA256 extract-and-expand into `out`
pub fn hkdf_expand(ikm: &[u8], salt: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(info, out)
        .map_err(|e| Error::KeyDerivation(e.to_string()))
}

/// Cryptographically secure random salt
pub fn generate_salt(length: usize) -> Result<Vec<u8>> {
    if length < MIN_SALT_LENGTH {
        return Err(Error::InvalidSaltLength(length));
    }
    let mut salt = vec![0u8; length];
    OsRng.fill_bytes(&mut salt);
    Ok(salt)
}

/// Fresh random 32-byte secret
pub fn random_secret() -> Zeroizing<[u8; 32]> {
    let mut secret = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut *secret);
    secret
}

/// Constant-time byte comparison (length is not secret)
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Keccak-256
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Keccak-256 over the concatenation of `parts`
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
