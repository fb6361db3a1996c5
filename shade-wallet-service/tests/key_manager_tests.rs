//! Key manager lifecycle tests

use shade_core::{Error, ExternalSigner, LocalSigner};
use shade_storage_sqlite::{MemoryVaultStore, SqliteVaultStore, VaultStore};
use shade_wallet_service::{KeyManager, KeyManagerConfig, KeyManagerState};
use std::sync::Arc;

const PASSWORD: &str = "Correct1!Password";
const NEW_PASSWORD: &str = "Another2@Password";
const USER: &str = "alice@example.com";
const AUTH: &str = "email";

fn signer() -> LocalSigner {
    LocalSigner::from_bytes(&[0x42; 32]).unwrap()
}

fn manager(store: Arc<dyn VaultStore>) -> KeyManager {
    KeyManager::new(store, KeyManagerConfig::insecure_fast())
}

#[tokio::test]
async fn test_full_lifecycle() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryVaultStore::new());
    let km = manager(Arc::clone(&store));
    let signer = signer();

    let public = km.initialize(PASSWORD, &signer, USER, AUTH).await.unwrap();
    assert_eq!(km.state(), KeyManagerState::Unlocked);
    assert_eq!(km.get_public_keys().unwrap(), public);

    let account = km.account_id().unwrap();
    let status = km.status();
    assert!(status.is_initialized);
    assert_eq!(status.user_id.as_deref(), Some(USER));
    assert_eq!(status.auth_method.as_deref(), Some(AUTH));

    km.lock().await;
    assert_eq!(km.state(), KeyManagerState::Locked);
    assert!(matches!(km.get_keys(), Err(Error::Locked)));

    let err = km.unlock("Wrong1!Password", &account).await.unwrap_err();
    assert!(matches!(err, Error::InvalidPassword));
    assert_eq!(km.state(), KeyManagerState::Locked);

    km.unlock(PASSWORD, &account).await.unwrap();
    assert_eq!(km.state(), KeyManagerState::Unlocked);
    assert_eq!(km.get_public_keys().unwrap(), public);
}

#[tokio::test]
async fn test_initialize_twice_is_rejected() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryVaultStore::new());
    let signer = signer();

    let km = manager(Arc::clone(&store));
    km.initialize(PASSWORD, &signer, USER, AUTH).await.unwrap();
    let err = km.initialize(PASSWORD, &signer, USER, AUTH).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
    assert!(km.is_unlocked());

    // A fresh manager over the same store sees the record
    let other = manager(store);
    let err = other
        .initialize(PASSWORD, &signer, USER, AUTH)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
    assert_eq!(other.state(), KeyManagerState::Locked);
    assert!(other.status().is_initialized);
}

#[tokio::test]
async fn test_unlock_unknown_account() {
    let km = manager(Arc::new(MemoryVaultStore::new()));
    let err = km
        .unlock(PASSWORD, "0x0000000000000000000000000000000000000001")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotInitialized(_)));
    assert_eq!(km.state(), KeyManagerState::Locked);
}

#[tokio::test]
async fn test_unlock_recovers_identical_keys() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryVaultStore::new());
    let signer = signer();

    let first = manager(Arc::clone(&store));
    first.initialize(PASSWORD, &signer, USER, AUTH).await.unwrap();
    let account = first.account_id().unwrap();
    let (viewing, spending) = {
        let keys = first.get_keys().unwrap();
        (*keys.viewing_private_key(), *keys.spending_private_key())
    };

    let second = manager(store);
    second.unlock(PASSWORD, &account).await.unwrap();
    let keys = second.get_keys().unwrap();
    assert_eq!(keys.viewing_private_key(), &viewing);
    assert_eq!(keys.spending_private_key(), &spending);
}

#[tokio::test]
async fn test_update_password() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryVaultStore::new());
    let km = manager(Arc::clone(&store));
    let public = km.initialize(PASSWORD, &signer(), USER, AUTH).await.unwrap();
    let account = km.account_id().unwrap();
    let before = store.load(&account).unwrap().unwrap();

    let err = km
        .update_password("Wrong1!Password", NEW_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPassword));
    assert!(km.is_unlocked());
    assert_eq!(store.load(&account).unwrap().unwrap(), before);

    let err = km.update_password(PASSWORD, "short").await.unwrap_err();
    assert!(matches!(err, Error::WeakPassword(_)));

    km.update_password(PASSWORD, NEW_PASSWORD).await.unwrap();
    let after = store.load(&account).unwrap().unwrap();
    assert_eq!(after.master_salt, before.master_salt);
    assert_ne!(after.unlock_salt, before.unlock_salt);
    assert_ne!(after.ciphertext, before.ciphertext);

    km.lock().await;
    let err = km.unlock(PASSWORD, &account).await.unwrap_err();
    assert!(matches!(err, Error::InvalidPassword));
    km.unlock(NEW_PASSWORD, &account).await.unwrap();
    assert_eq!(km.get_public_keys().unwrap(), public);
}

#[tokio::test]
async fn test_reset() {
    let store: Arc<dyn VaultStore> = Arc::new(MemoryVaultStore::new());
    let km = manager(Arc::clone(&store));
    km.initialize(PASSWORD, &signer(), USER, AUTH).await.unwrap();
    let account = km.account_id().unwrap();

    assert!(km.reset(&account).await.unwrap());
    assert_eq!(km.state(), KeyManagerState::Uninitialized);
    assert!(km.account_id().is_none());
    assert!(!store.exists(&account).unwrap());
    assert!(!km.reset(&account).await.unwrap());

    // The account can be set up again from scratch
    km.initialize(PASSWORD, &signer(), USER, AUTH).await.unwrap();
    assert!(km.is_unlocked());
}

#[tokio::test]
async fn test_sqlite_vault_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");
    let signer = signer();

    let (account, public) = {
        let store = Arc::new(SqliteVaultStore::open(&path).unwrap());
        let km = manager(store);
        let public = km.initialize(PASSWORD, &signer, USER, AUTH).await.unwrap();
        (km.account_id().unwrap(), public)
    };
    assert_eq!(account, signer.account().checksum_hex());

    let km = manager(Arc::new(SqliteVaultStore::open(&path).unwrap()));
    km.unlock(PASSWORD, &account).await.unwrap();
    assert_eq!(km.get_public_keys().unwrap(), public);
    assert_eq!(km.status().user_id.as_deref(), Some(USER));
}
