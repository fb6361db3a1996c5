//! Vault integration tests
//!
//! Seal a derived key set, persist it in SQLite, reopen the database and
//! unseal it again.

use proptest::prelude::*;
use shade_core::keys::{derive_key_set, derive_unlock_key};
use shade_core::{generate_salt, KdfConfig, KeySet};
use shade_storage_sqlite::{
    decrypt_key_set, encrypt_key_set, rekey_record, Error, SqliteVaultStore, VaultAlgorithm,
    VaultIdentity, VaultStore,
};
use tempfile::TempDir;

const ACCOUNT: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

fn identity() -> VaultIdentity {
    VaultIdentity::new(ACCOUNT, "alice@example.com", "email")
}

fn keys(master_salt: &[u8]) -> KeySet {
    derive_key_set(
        "Correct1!Password",
        &[0x2a; 65],
        master_salt,
        &KdfConfig::INSECURE_FAST,
    )
    .unwrap()
}

#[test]
fn test_sealed_record_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.db");

    let master_salt = generate_salt(32).unwrap();
    let unlock_salt = generate_salt(32).unwrap();
    let key_set = keys(&master_salt);
    let unlock_key =
        derive_unlock_key("Correct1!Password", &unlock_salt, &KdfConfig::INSECURE_FAST).unwrap();

    {
        let store = SqliteVaultStore::open(&path).unwrap();
        let record = encrypt_key_set(
            &key_set,
            &unlock_key,
            &identity(),
            &master_salt,
            &unlock_salt,
            VaultAlgorithm::Aes256Gcm,
        )
        .unwrap();
        store.save(&record).unwrap();
    }

    let store = SqliteVaultStore::open(&path).unwrap();
    let record = store.load(ACCOUNT).unwrap().expect("record persisted");
    assert_eq!(record.master_salt, master_salt);
    assert_eq!(record.unlock_salt, unlock_salt);

    // Password alone re-derives the unlock key.
    let unlock_again =
        derive_unlock_key("Correct1!Password", &record.unlock_salt, &KdfConfig::INSECURE_FAST)
            .unwrap();
    let opened = decrypt_key_set(&record, &unlock_again).unwrap();
    assert_eq!(opened.public_keys(), key_set.public_keys());

    let wrong =
        derive_unlock_key("WrongPassword", &record.unlock_salt, &KdfConfig::INSECURE_FAST).unwrap();
    assert!(matches!(decrypt_key_set(&record, &wrong), Err(Error::DecryptionFailed)));
}

#[test]
fn test_database_file_holds_no_key_material() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.db");
    let master_salt = [5u8; 32];
    let key_set = keys(&master_salt);

    let store = SqliteVaultStore::open(&path).unwrap();
    let record = encrypt_key_set(
        &key_set,
        &[1; 32],
        &identity(),
        &master_salt,
        &[6; 32],
        VaultAlgorithm::ChaCha20Poly1305,
    )
    .unwrap();
    store.save(&record).unwrap();
    drop(store);

    let mut raw = std::fs::read(&path).unwrap();
    if let Ok(wal) = std::fs::read(dir.path().join("vault.db-wal")) {
        raw.extend(wal);
    }
    for secret in [
        key_set.master_key(),
        key_set.storage_key(),
        key_set.viewing_private_key(),
        key_set.spending_private_key(),
    ] {
        assert!(!raw.windows(32).any(|w| w == secret));
    }
}

#[test]
fn test_password_rotation_record() {
    let store = SqliteVaultStore::in_memory().unwrap();
    let master_salt = [5u8; 32];
    let key_set = keys(&master_salt);

    let original = encrypt_key_set(
        &key_set,
        &[1; 32],
        &identity(),
        &master_salt,
        &[6; 32],
        VaultAlgorithm::Aes256Gcm,
    )
    .unwrap();
    store.save(&original).unwrap();

    let rotated = rekey_record(&original, &key_set, &[2; 32], &[7; 32]).unwrap();
    store.save(&rotated).unwrap();

    let loaded = store.load(ACCOUNT).unwrap().unwrap();
    assert_eq!(loaded.master_salt, original.master_salt);
    assert_ne!(loaded.unlock_salt, original.unlock_salt);
    assert!(decrypt_key_set(&loaded, &[1; 32]).is_err());
    assert_eq!(
        decrypt_key_set(&loaded, &[2; 32]).unwrap().public_keys(),
        key_set.public_keys()
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: Flipping any ciphertext bit makes the record unopenable
    #[test]
    fn prop_any_bit_flip_fails(index in 0usize..129, bit in 0u8..8) {
        let master_salt = [5u8; 32];
        let key_set = keys(&master_salt);
        let mut record = encrypt_key_set(
            &key_set,
            &[1; 32],
            &identity(),
            &master_salt,
            &[6; 32],
            VaultAlgorithm::Aes256Gcm,
        )
        .unwrap();

        record.ciphertext[index] ^= 1 << bit;
        prop_assert!(matches!(decrypt_key_set(&record, &[1; 32]), Err(Error::DecryptionFailed)));
    }
}
