//! Key set encryption at rest
//!
//! The private components of a [`KeySet`] are laid out as
//! `[version(1)][master(32)][storage(32)][viewing(32)][spending(32)]` and
//! sealed with AES-256-GCM or ChaCha20-Poly1305 under the unlock key. The
//! tag is stored apart from the ciphertext. Associated data binds the format
//! version, the algorithm and the record owner, so a record moved to another
//! account fails to open.

use crate::models::{VaultAlgorithm, VaultIdentity, VaultRecord};
use crate::{Error, Result};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use rand::{rngs::OsRng, RngCore};
use shade_core::KeySet;
use shade_params::domain::VAULT_FORMAT_VERSION;
use zeroize::Zeroizing;

/// AEAD nonce length
pub const NONCE_LENGTH: usize = 12;

/// AEAD tag length
pub const TAG_LENGTH: usize = 16;

const PLAINTEXT_LENGTH: usize = 1 + 4 * 32;

/// Encrypt `key_set` into a fresh vault record
pub fn encrypt_key_set(
    key_set: &KeySet,
    unlock_key: &[u8; 32],
    identity: &VaultIdentity,
    master_salt: &[u8],
    unlock_salt: &[u8],
    algorithm: VaultAlgorithm,
) -> Result<VaultRecord> {
    let mut buffer = serialize_key_set(key_set);
    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    let aad = associated_data(VAULT_FORMAT_VERSION, algorithm, identity);

    let tag = match algorithm {
        VaultAlgorithm::Aes256Gcm => Aes256Gcm::new(unlock_key.into())
            .encrypt_in_place_detached(&nonce.into(), &aad, buffer.as_mut_slice())
            .map(|tag| tag.to_vec()),
        VaultAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new(unlock_key.into())
            .encrypt_in_place_detached(&nonce.into(), &aad, buffer.as_mut_slice())
            .map(|tag| tag.to_vec()),
    }
    .map_err(|e| Error::Encryption(e.to_string()))?;

    let now = chrono::Utc::now().timestamp();
    Ok(VaultRecord {
        version: VAULT_FORMAT_VERSION,
        algorithm,
        ciphertext: buffer.to_vec(),
        nonce: nonce.to_vec(),
        tag,
        master_salt: master_salt.to_vec(),
        unlock_salt: unlock_salt.to_vec(),
        identity: identity.clone(),
        created_at: now,
        updated_at: now,
    })
}

/// Open a vault record with `unlock_key`.
///
/// Every failure mode (wrong key, tampered ciphertext, tag or owner, unknown
/// version, malformed lengths) surfaces as [`Error::DecryptionFailed`].
pub fn decrypt_key_set(record: &VaultRecord, unlock_key: &[u8; 32]) -> Result<KeySet> {
    if record.version != VAULT_FORMAT_VERSION
        || record.nonce.len() != NONCE_LENGTH
        || record.tag.len() != TAG_LENGTH
        || record.ciphertext.len() != PLAINTEXT_LENGTH
    {
        tracing::debug!(
            account_id = %record.account_id(),
            version = record.version,
            "vault record has an unexpected shape"
        );
        return Err(Error::DecryptionFailed);
    }

    let aad = associated_data(record.version, record.algorithm, &record.identity);
    let mut buffer = Zeroizing::new(record.ciphertext.clone());
    let nonce = GenericArray::from_slice(&record.nonce);
    let tag = GenericArray::from_slice(&record.tag);

    match record.algorithm {
        VaultAlgorithm::Aes256Gcm => Aes256Gcm::new(unlock_key.into())
            .decrypt_in_place_detached(nonce, &aad, buffer.as_mut_slice(), tag),
        VaultAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new(unlock_key.into())
            .decrypt_in_place_detached(nonce, &aad, buffer.as_mut_slice(), tag),
    }
    .map_err(|_| Error::DecryptionFailed)?;

    deserialize_key_set(&buffer)
}

/// Re-seal an existing record's key set under a new unlock key and salt.
///
/// The master salt, owner and creation time carry over.
pub fn rekey_record(
    record: &VaultRecord,
    key_set: &KeySet,
    new_unlock_key: &[u8; 32],
    new_unlock_salt: &[u8],
) -> Result<VaultRecord> {
    let mut rekeyed = encrypt_key_set(
        key_set,
        new_unlock_key,
        &record.identity,
        &record.master_salt,
        new_unlock_salt,
        record.algorithm,
    )?;
    rekeyed.created_at = record.created_at;
    Ok(rekeyed)
}

fn associated_data(version: u8, algorithm: VaultAlgorithm, identity: &VaultIdentity) -> Vec<u8> {
    let mut aad = vec![version, algorithm.as_byte()];
    for field in [&identity.account_id, &identity.user_id, &identity.auth_method] {
        // Length prefixes keep field boundaries unambiguous.
        aad.extend_from_slice(&(field.len() as u32).to_be_bytes());
        aad.extend_from_slice(field.as_bytes());
    }
    aad
}

fn serialize_key_set(key_set: &KeySet) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(PLAINTEXT_LENGTH));
    out.push(VAULT_FORMAT_VERSION);
    out.extend_from_slice(key_set.master_key());
    out.extend_from_slice(key_set.storage_key());
    out.extend_from_slice(key_set.viewing_private_key());
    out.extend_from_slice(key_set.spending_private_key());
    out
}

fn deserialize_key_set(plaintext: &[u8]) -> Result<KeySet> {
    if plaintext.len() != PLAINTEXT_LENGTH || plaintext[0] != VAULT_FORMAT_VERSION {
        return Err(Error::DecryptionFailed);
    }

    let mut parts = Zeroizing::new([[0u8; 32]; 4]);
    for (i, part) in parts.iter_mut().enumerate() {
        let start = 1 + i * 32;
        part.copy_from_slice(&plaintext[start..start + 32]);
    }

    let key_set = KeySet::from_private_parts(&parts[0], &parts[1], &parts[2], &parts[3])
        .map_err(|_| Error::DecryptionFailed)?;
    key_set.validate().map_err(|_| Error::DecryptionFailed)?;
    Ok(key_set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_core::keys::derive_key_set;
    use shade_core::KdfConfig;

    fn key_set() -> KeySet {
        derive_key_set("Correct1!Password", &[0x1b; 65], &[9u8; 32], &KdfConfig::INSECURE_FAST)
            .unwrap()
    }

    fn identity() -> VaultIdentity {
        VaultIdentity::new("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf", "alice@example.com", "email")
    }

    #[test]
    fn test_round_trip_both_algorithms() {
        let keys = key_set();
        for algorithm in [VaultAlgorithm::Aes256Gcm, VaultAlgorithm::ChaCha20Poly1305] {
            let record =
                encrypt_key_set(&keys, &[7u8; 32], &identity(), &[1; 32], &[2; 32], algorithm)
                    .unwrap();
            assert_eq!(record.nonce.len(), NONCE_LENGTH);
            assert_eq!(record.tag.len(), TAG_LENGTH);
            assert_eq!(record.algorithm, algorithm);

            let opened = decrypt_key_set(&record, &[7u8; 32]).unwrap();
            assert_eq!(opened.master_key(), keys.master_key());
            assert_eq!(opened.storage_key(), keys.storage_key());
            assert_eq!(opened.public_keys(), keys.public_keys());
        }
    }

    #[test]
    fn test_ciphertext_hides_key_material() {
        let keys = key_set();
        let record = encrypt_key_set(
            &keys,
            &[7u8; 32],
            &identity(),
            &[1; 32],
            &[2; 32],
            VaultAlgorithm::default(),
        )
        .unwrap();
        let needle = &keys.viewing_private_key()[..];
        assert!(!record.ciphertext.windows(32).any(|w| w == needle));
    }

    #[test]
    fn test_nonces_are_fresh() {
        let keys = key_set();
        let a = encrypt_key_set(&keys, &[7; 32], &identity(), &[1; 32], &[2; 32], VaultAlgorithm::Aes256Gcm).unwrap();
        let b = encrypt_key_set(&keys, &[7; 32], &identity(), &[1; 32], &[2; 32], VaultAlgorithm::Aes256Gcm).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let record = encrypt_key_set(
            &key_set(),
            &[7u8; 32],
            &identity(),
            &[1; 32],
            &[2; 32],
            VaultAlgorithm::Aes256Gcm,
        )
        .unwrap();
        assert!(matches!(
            decrypt_key_set(&record, &[8u8; 32]),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampering_fails() {
        let record = encrypt_key_set(
            &key_set(),
            &[7u8; 32],
            &identity(),
            &[1; 32],
            &[2; 32],
            VaultAlgorithm::ChaCha20Poly1305,
        )
        .unwrap();

        let mut flipped = record.clone();
        flipped.ciphertext[10] ^= 1;
        assert!(matches!(decrypt_key_set(&flipped, &[7; 32]), Err(Error::DecryptionFailed)));

        let mut bad_tag = record.clone();
        bad_tag.tag[0] ^= 1;
        assert!(matches!(decrypt_key_set(&bad_tag, &[7; 32]), Err(Error::DecryptionFailed)));

        let mut moved = record.clone();
        moved.identity.user_id = "mallory@example.com".to_string();
        assert!(matches!(decrypt_key_set(&moved, &[7; 32]), Err(Error::DecryptionFailed)));

        let mut swapped = record.clone();
        swapped.algorithm = VaultAlgorithm::Aes256Gcm;
        assert!(matches!(decrypt_key_set(&swapped, &[7; 32]), Err(Error::DecryptionFailed)));

        let mut short_nonce = record;
        short_nonce.nonce.pop();
        assert!(matches!(decrypt_key_set(&short_nonce, &[7; 32]), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_rekey_preserves_master_salt() {
        let keys = key_set();
        let record = encrypt_key_set(&keys, &[7; 32], &identity(), &[1; 32], &[2; 32], VaultAlgorithm::Aes256Gcm).unwrap();
        let rekeyed = rekey_record(&record, &keys, &[8; 32], &[3; 32]).unwrap();

        assert_eq!(rekeyed.master_salt, record.master_salt);
        assert_eq!(rekeyed.unlock_salt, vec![3; 32]);
        assert_eq!(rekeyed.created_at, record.created_at);
        assert!(decrypt_key_set(&rekeyed, &[7; 32]).is_err());
        assert_eq!(
            decrypt_key_set(&rekeyed, &[8; 32]).unwrap().public_keys(),
            keys.public_keys()
        );
    }
}
