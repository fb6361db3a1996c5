//! Key derivation hierarchy
//!
//! Two-factor derivation: an Argon2id password hash and an external wallet
//! signature are combined into a master key, which fans out into
//! purpose-bound sub-keys (storage encryption, meta-viewing, meta-spending).
//! The unlock key is derived from the password alone so routine unlocking
//! never needs the external signer.

use crate::crypto::{hash_password, hkdf_expand, KdfConfig, SECP};
use crate::{Error, Result};
use secp256k1::{PublicKey, SecretKey};
use shade_params::domain::{
    MASTER_KEY_INFO, MASTER_KEY_SALT, PURPOSE_SPENDING, PURPOSE_STORAGE, PURPOSE_VIEWING,
    SUBKEY_INFO_PREFIX, SUBKEY_SALT, UNLOCK_KEY_INFO, UNLOCK_KEY_SALT,
};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Maximum sub-key output length in bytes
pub const MAX_SUBKEY_LENGTH: usize = 255;

/// Combine a password hash and an external signature into the master key
pub fn derive_master_key(
    password_hash: &[u8],
    external_signature: &[u8],
) -> Result<Zeroizing<[u8; 32]>> {
    if password_hash.is_empty() || external_signature.is_empty() {
        return Err(Error::KeyDerivation(
            "master key inputs must be non-empty".to_string(),
        ));
    }

    let mut ikm = Zeroizing::new(Vec::with_capacity(
        password_hash.len() + external_signature.len(),
    ));
    ikm.extend_from_slice(password_hash);
    ikm.extend_from_slice(external_signature);

    let mut master = Zeroizing::new([0u8; 32]);
    hkdf_expand(&ikm, MASTER_KEY_SALT, MASTER_KEY_INFO, &mut *master)?;
    Ok(master)
}

/// Derive a purpose-bound sub-key of `length` bytes
pub fn derive_sub_key(
    master_key: &[u8],
    purpose: &str,
    length: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if master_key.len() != 32 {
        return Err(Error::InvalidMasterKey(format!(
            "expected 32 bytes, got {}",
            master_key.len()
        )));
    }
    if length == 0 || length > MAX_SUBKEY_LENGTH {
        return Err(Error::InvalidKeyLength(length));
    }

    let mut info = Vec::with_capacity(SUBKEY_INFO_PREFIX.len() + purpose.len());
    info.extend_from_slice(SUBKEY_INFO_PREFIX);
    info.extend_from_slice(purpose.as_bytes());

    let mut out = Zeroizing::new(vec![0u8; length]);
    hkdf_expand(master_key, SUBKEY_SALT, &info, &mut out)?;
    Ok(out)
}

/// 32-byte sub-key
pub fn derive_sub_key_32(master_key: &[u8; 32], purpose: &str) -> Result<Zeroizing<[u8; 32]>> {
    let bytes = derive_sub_key(master_key, purpose, 32)?;
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Password-only unlock key (Argon2id with the unlock salt, then HKDF)
pub fn derive_unlock_key(
    password: &str,
    unlock_salt: &[u8],
    config: &KdfConfig,
) -> Result<Zeroizing<[u8; 32]>> {
    let password_hash = hash_password(password, unlock_salt, config)?;
    let mut unlock = Zeroizing::new([0u8; 32]);
    hkdf_expand(&*password_hash, UNLOCK_KEY_SALT, UNLOCK_KEY_INFO, &mut *unlock)?;
    Ok(unlock)
}

/// Run the full two-factor derivation and build a validated key set
pub fn derive_key_set(
    password: &str,
    external_signature: &[u8],
    master_salt: &[u8],
    config: &KdfConfig,
) -> Result<KeySet> {
    let password_hash = hash_password(password, master_salt, config)?;
    let master = derive_master_key(&*password_hash, external_signature)?;
    let storage = derive_sub_key_32(&master, PURPOSE_STORAGE)?;
    let viewing = derive_sub_key_32(&master, PURPOSE_VIEWING)?;
    let spending = derive_sub_key_32(&master, PURPOSE_SPENDING)?;
    tracing::debug!("derived purpose sub-keys from master key");

    KeySet::from_private_parts(&master, &storage, &viewing, &spending)
}

/// Active key material held by an unlocked wallet.
///
/// Private parts are plain byte arrays so they can be wiped in place;
/// `secp256k1::SecretKey` values are built on demand and never stored.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeySet {
    master_key: [u8; 32],
    storage_key: [u8; 32],
    viewing_private_key: [u8; 32],
    spending_private_key: [u8; 32],
    #[zeroize(skip)]
    viewing_public_key: PublicKey,
    #[zeroize(skip)]
    spending_public_key: PublicKey,
}

impl KeySet {
    /// Build from the four private components, computing the public meta-keys
    pub fn from_private_parts(
        master_key: &[u8; 32],
        storage_key: &[u8; 32],
        viewing_private_key: &[u8; 32],
        spending_private_key: &[u8; 32],
    ) -> Result<Self> {
        let viewing = secret_key(viewing_private_key, "meta-viewing")?;
        let spending = secret_key(spending_private_key, "meta-spending")?;

        let keys = Self {
            master_key: *master_key,
            storage_key: *storage_key,
            viewing_private_key: *viewing_private_key,
            spending_private_key: *spending_private_key,
            viewing_public_key: PublicKey::from_secret_key(&SECP, &viewing),
            spending_public_key: PublicKey::from_secret_key(&SECP, &spending),
        };
        keys.validate()?;
        Ok(keys)
    }

    /// Check that every component is non-zero and the public keys match
    pub fn validate(&self) -> Result<()> {
        for (name, bytes) in [
            ("master", &self.master_key),
            ("storage-encryption", &self.storage_key),
            ("meta-viewing", &self.viewing_private_key),
            ("meta-spending", &self.spending_private_key),
        ] {
            if bytes.iter().all(|&b| b == 0) {
                return Err(Error::InvalidDerivedKeys(format!("{} key is zero", name)));
            }
        }

        let viewing = secret_key(&self.viewing_private_key, "meta-viewing")?;
        let spending = secret_key(&self.spending_private_key, "meta-spending")?;
        if PublicKey::from_secret_key(&SECP, &viewing) != self.viewing_public_key {
            return Err(Error::InvalidDerivedKeys(
                "meta-viewing public key mismatch".to_string(),
            ));
        }
        if PublicKey::from_secret_key(&SECP, &spending) != self.spending_public_key {
            return Err(Error::InvalidDerivedKeys(
                "meta-spending public key mismatch".to_string(),
            ));
        }
        Ok(())
    }

    /// Master key
    pub fn master_key(&self) -> &[u8; 32] {
        &self.master_key
    }

    /// Storage encryption key
    pub fn storage_key(&self) -> &[u8; 32] {
        &self.storage_key
    }

    /// Meta-viewing private key
    pub fn viewing_private_key(&self) -> &[u8; 32] {
        &self.viewing_private_key
    }

    /// Meta-spending private key
    pub fn spending_private_key(&self) -> &[u8; 32] {
        &self.spending_private_key
    }

    /// Meta-viewing public key
    pub fn viewing_public_key(&self) -> &PublicKey {
        &self.viewing_public_key
    }

    /// Meta-spending public key
    pub fn spending_public_key(&self) -> &PublicKey {
        &self.spending_public_key
    }

    /// The two public meta-keys
    pub fn public_keys(&self) -> PublicMetaKeys {
        PublicMetaKeys {
            viewing: self.viewing_public_key,
            spending: self.spending_public_key,
        }
    }

    /// Copy of the viewing private key and spending public key for one scan
    pub fn scan_keys(&self) -> ScanKeys {
        ScanKeys {
            viewing_private_key: self.viewing_private_key,
            spending_public_key: self.spending_public_key,
        }
    }

    /// True once every private byte has been overwritten with zero
    pub fn is_zeroed(&self) -> bool {
        [
            &self.master_key,
            &self.storage_key,
            &self.viewing_private_key,
            &self.spending_private_key,
        ]
        .iter()
        .all(|k| k.iter().all(|&b| b == 0))
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("viewing_public_key", &hex::encode(self.viewing_public_key.serialize()))
            .field("spending_public_key", &hex::encode(self.spending_public_key.serialize()))
            .finish_non_exhaustive()
    }
}

/// Keys a payment scan needs: enough to recognize payments, not to spend them.
///
/// Handed out per operation; wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ScanKeys {
    viewing_private_key: [u8; 32],
    #[zeroize(skip)]
    spending_public_key: PublicKey,
}

impl ScanKeys {
    /// Meta-viewing private key
    pub fn viewing_private_key(&self) -> &[u8; 32] {
        &self.viewing_private_key
    }

    /// Meta-spending public key
    pub fn spending_public_key(&self) -> &PublicKey {
        &self.spending_public_key
    }
}

impl fmt::Debug for ScanKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanKeys")
            .field("spending_public_key", &hex::encode(self.spending_public_key.serialize()))
            .finish_non_exhaustive()
    }
}

/// Public meta-keys, safe to publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicMetaKeys {
    /// Meta-viewing public key
    pub viewing: PublicKey,
    /// Meta-spending public key
    pub spending: PublicKey,
}

impl PublicMetaKeys {
    /// Parse from two compressed (33-byte) or uncompressed (65-byte) encodings
    pub fn from_slices(viewing: &[u8], spending: &[u8]) -> Result<Self> {
        Ok(Self {
            viewing: parse_public_key(viewing)?,
            spending: parse_public_key(spending)?,
        })
    }

    /// Compressed meta-viewing key
    pub fn viewing_bytes(&self) -> [u8; 33] {
        self.viewing.serialize()
    }

    /// Compressed meta-spending key
    pub fn spending_bytes(&self) -> [u8; 33] {
        self.spending.serialize()
    }
}

/// Parse a secp256k1 public key
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_slice(bytes).map_err(|e| Error::InvalidPublicKey(e.to_string()))
}

pub(crate) fn secret_key(bytes: &[u8; 32], name: &str) -> Result<SecretKey> {
    SecretKey::from_slice(bytes)
        .map_err(|_| Error::InvalidDerivedKeys(format!("{} key is not a valid scalar", name)))
}
