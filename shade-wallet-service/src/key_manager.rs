//! Key manager
//!
//! Owns the wallet key set between unlock and lock. States:
//!
//! ```text
//!                initialize                 lock
//! Uninitialized ───────────► Unlocked ◄──────────► Locked
//!                                        unlock
//! ```
//!
//! Transitions are serialized by one async mutex. Argon2id runs on the
//! blocking pool. A transition that fails, or whose future is dropped before
//! it finishes, leaves the manager `Locked` with no key material in memory.

use crate::config::KeyManagerConfig;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use serde::Serialize;
use shade_core::keys::derive_key_set;
use shade_core::{
    derive_unlock_key, generate_salt, signing_message, validate_new_password, Error,
    ExternalSigner, KdfConfig, KeySet, PublicMetaKeys, Result, ScanKeys,
};
use shade_storage_sqlite::{
    decrypt_key_set, encrypt_key_set, rekey_record, VaultIdentity, VaultRecord, VaultStore,
};
use std::fmt;
use std::sync::Arc;
use zeroize::{Zeroize, Zeroizing};

/// Key manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyManagerState {
    /// No vault known to this manager
    Uninitialized,
    /// No key material in memory
    Locked,
    /// Key set held in memory
    Unlocked,
}

impl fmt::Display for KeyManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyManagerState::Uninitialized => "uninitialized",
            KeyManagerState::Locked => "locked",
            KeyManagerState::Unlocked => "unlocked",
        };
        f.write_str(name)
    }
}

/// Snapshot of the manager, safe to display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyManagerStatus {
    /// Current state
    pub state: KeyManagerState,
    /// Whether a vault record is known to exist for the account
    pub is_initialized: bool,
    /// Whether keys are in memory
    pub is_unlocked: bool,
    /// Ledger account the vault belongs to
    pub account_id: Option<String>,
    /// User identifier bound into the vault
    pub user_id: Option<String>,
    /// Auth method bound into the vault
    pub auth_method: Option<String>,
}

/// Scoped read access to the unlocked key set.
///
/// `lock` waits until every borrow is released.
pub type KeysGuard<'a> = MappedRwLockReadGuard<'a, KeySet>;

struct ManagerInner {
    state: KeyManagerState,
    initialized: bool,
    identity: Option<VaultIdentity>,
    keys: Option<KeySet>,
    /// Whether the last wiped key set read back as all zero
    #[cfg(test)]
    last_wipe_zeroed: Option<bool>,
}

impl ManagerInner {
    fn new() -> Self {
        Self {
            state: KeyManagerState::Uninitialized,
            initialized: false,
            identity: None,
            keys: None,
            #[cfg(test)]
            last_wipe_zeroed: None,
        }
    }

    fn wipe(&mut self) {
        if let Some(mut keys) = self.keys.take() {
            keys.zeroize();
            debug_assert!(keys.is_zeroed());
            #[cfg(test)]
            {
                self.last_wipe_zeroed = Some(keys.is_zeroed());
            }
        }
    }

    /// Wipe and mark `Locked`; state and key material change together
    fn lock_out(&mut self) {
        self.wipe();
        self.state = KeyManagerState::Locked;
    }
}

/// Forces `Locked` unless the transition it guards completes
struct TransitionGuard<'a> {
    inner: &'a RwLock<ManagerInner>,
    identity: Option<VaultIdentity>,
    record_exists: bool,
    armed: bool,
}

impl<'a> TransitionGuard<'a> {
    fn new(inner: &'a RwLock<ManagerInner>) -> Self {
        Self {
            inner,
            identity: None,
            record_exists: false,
            armed: true,
        }
    }

    fn complete(mut self, identity: VaultIdentity, keys: KeySet) {
        self.armed = false;
        let mut inner = self.inner.write();
        inner.wipe();
        inner.state = KeyManagerState::Unlocked;
        inner.initialized = true;
        inner.identity = Some(identity);
        inner.keys = Some(keys);
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.write();
        inner.lock_out();
        if let Some(identity) = self.identity.take() {
            inner.identity = Some(identity);
            inner.initialized = self.record_exists;
        }
        tracing::debug!("key manager transition did not complete; locked");
    }
}

/// Wallet key manager.
///
/// One instance per process, owned by the caller and shared by reference
/// (typically in an `Arc`).
pub struct KeyManager {
    store: Arc<dyn VaultStore>,
    config: KeyManagerConfig,
    op: tokio::sync::Mutex<()>,
    inner: RwLock<ManagerInner>,
}

impl KeyManager {
    /// Manager persisting through `store`
    pub fn new(store: Arc<dyn VaultStore>, config: KeyManagerConfig) -> Self {
        Self {
            store,
            config,
            op: tokio::sync::Mutex::new(()),
            inner: RwLock::new(ManagerInner::new()),
        }
    }

    /// Current state
    pub fn state(&self) -> KeyManagerState {
        self.inner.read().state
    }

    /// Whether keys are in memory
    pub fn is_unlocked(&self) -> bool {
        self.state() == KeyManagerState::Unlocked
    }

    /// Display snapshot
    pub fn status(&self) -> KeyManagerStatus {
        let inner = self.inner.read();
        let identity = inner.identity.as_ref();
        KeyManagerStatus {
            state: inner.state,
            is_initialized: inner.initialized,
            is_unlocked: inner.state == KeyManagerState::Unlocked,
            account_id: identity.map(|id| id.account_id.clone()),
            user_id: identity.map(|id| id.user_id.clone()),
            auth_method: identity.map(|id| id.auth_method.clone()),
        }
    }

    /// Account of the current vault, if known
    pub fn account_id(&self) -> Option<String> {
        self.status().account_id
    }

    /// Create the vault for `signer`'s account and unlock it.
    ///
    /// The signer is asked for one signature over [`signing_message`]; it is
    /// a derivation input and never stored.
    pub async fn initialize(
        &self,
        password: &str,
        signer: &dyn ExternalSigner,
        user_id: &str,
        auth_method: &str,
    ) -> Result<PublicMetaKeys> {
        let _op = self.op.lock().await;
        let account_id = signer.account().checksum_hex();
        if self.is_unlocked() {
            return Err(Error::AlreadyExists(account_id));
        }

        let mut guard = TransitionGuard::new(&self.inner);
        let identity = VaultIdentity::new(&account_id, user_id, auth_method);
        guard.identity = Some(identity.clone());

        if self.store.exists(&account_id)? {
            guard.record_exists = true;
            tracing::warn!(account_id = %account_id, "vault already exists");
            return Err(Error::AlreadyExists(account_id));
        }
        validate_new_password(password)?;

        let message = signing_message(user_id, auth_method);
        let signature = Zeroizing::new(signer.sign_message(message.as_bytes()).await?);
        let master_salt = generate_salt(self.config.salt_length)?;
        let unlock_salt = generate_salt(self.config.salt_length)?;

        let key_set = {
            let password = Zeroizing::new(password.to_owned());
            let master_salt = master_salt.clone();
            let kdf = self.config.kdf;
            run_blocking(move || derive_key_set(&password, &signature[..], &master_salt, &kdf))
                .await?
        };
        key_set.validate()?;

        let unlock_key = self.derive_unlock(password, &unlock_salt).await?;
        let record = encrypt_key_set(
            &key_set,
            &unlock_key,
            &identity,
            &master_salt,
            &unlock_salt,
            self.config.algorithm,
        )?;
        drop(unlock_key);

        self.store.save(&record)?;
        guard.record_exists = true;

        let public_keys = key_set.public_keys();
        guard.complete(identity, key_set);
        tracing::info!(account_id = %account_id, auth_method, "initialized vault");
        Ok(public_keys)
    }

    /// Open the vault of `account_id` with the password alone.
    ///
    /// Every failure other than a missing vault is reported as
    /// [`Error::InvalidPassword`].
    pub async fn unlock(&self, password: &str, account_id: &str) -> Result<()> {
        let _op = self.op.lock().await;
        let mut guard = TransitionGuard::new(&self.inner);
        self.inner.write().lock_out();

        let record = match self.store.load(account_id) {
            Ok(Some(record)) => record,
            Ok(None) => return Err(Error::NotInitialized(account_id.to_string())),
            Err(e) => {
                tracing::debug!(error = %e, "vault load failed");
                return Err(Error::InvalidPassword);
            }
        };
        guard.identity = Some(record.identity.clone());
        guard.record_exists = true;

        match self.open_record(password, &record).await {
            Ok(key_set) => {
                guard.complete(record.identity.clone(), key_set);
                tracing::info!(account_id = %account_id, "unlocked vault");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(account_id = %account_id, error = %e, "unlock failed");
                Err(Error::InvalidPassword)
            }
        }
    }

    /// Wipe the key set from memory. Idempotent.
    ///
    /// Waits for outstanding [`get_keys`](Self::get_keys) borrows.
    pub async fn lock(&self) {
        let _op = self.op.lock().await;
        let mut inner = self.inner.write();
        if inner.state == KeyManagerState::Unlocked {
            inner.lock_out();
            tracing::info!("locked key manager");
        }
    }

    /// Borrow the key set; fails with [`Error::Locked`] unless unlocked
    pub fn get_keys(&self) -> Result<KeysGuard<'_>> {
        RwLockReadGuard::try_map(self.inner.read(), |inner| inner.keys.as_ref())
            .map_err(|_| Error::Locked)
    }

    /// Public meta-keys of the unlocked wallet
    pub fn get_public_keys(&self) -> Result<PublicMetaKeys> {
        Ok(self.get_keys()?.public_keys())
    }

    /// Per-operation copy of the keys a payment scan needs; wiped on drop
    pub fn scan_keys(&self) -> Result<ScanKeys> {
        Ok(self.get_keys()?.scan_keys())
    }

    /// Re-encrypt the vault under `new_password`.
    ///
    /// `old_password` is checked against the stored record first; on failure
    /// nothing is written and the state is unchanged. The master key salt
    /// carries over, so every derived key stays the same.
    pub async fn update_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let _op = self.op.lock().await;
        let account_id = self
            .account_id()
            .ok_or_else(|| Error::NotInitialized("no account".to_string()))?;
        let record = self
            .store
            .load(&account_id)?
            .ok_or_else(|| Error::NotInitialized(account_id.clone()))?;

        let key_set = match self.open_record(old_password, &record).await {
            Ok(key_set) => key_set,
            Err(e) => {
                tracing::debug!(account_id = %account_id, error = %e, "password check failed");
                return Err(Error::InvalidPassword);
            }
        };
        validate_new_password(new_password)?;

        let unlock_salt = generate_salt(self.config.salt_length)?;
        let unlock_key = self.derive_unlock(new_password, &unlock_salt).await?;
        let rekeyed = rekey_record(&record, &key_set, &unlock_key, &unlock_salt)?;
        drop(unlock_key);
        self.store.save(&rekeyed)?;

        tracing::info!(account_id = %account_id, "changed vault password");
        Ok(())
    }

    /// Delete the vault of `account_id` and forget it.
    ///
    /// Returns whether a record existed. Irreversible without the password
    /// and the external signer.
    pub async fn reset(&self, account_id: &str) -> Result<bool> {
        let _op = self.op.lock().await;
        let existed = self.store.delete(account_id)?;

        let mut inner = self.inner.write();
        let current = inner
            .identity
            .as_ref()
            .map(|id| id.account_id == account_id)
            .unwrap_or(true);
        if current {
            inner.wipe();
            inner.state = KeyManagerState::Uninitialized;
            inner.identity = None;
            inner.initialized = false;
        }
        tracing::info!(account_id = %account_id, existed, "reset vault");
        Ok(existed)
    }

    async fn derive_unlock(&self, password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        let password = Zeroizing::new(password.to_owned());
        let salt = salt.to_vec();
        let kdf: KdfConfig = self.config.kdf;
        run_blocking(move || derive_unlock_key(&password, &salt, &kdf)).await
    }

    async fn open_record(&self, password: &str, record: &VaultRecord) -> Result<KeySet> {
        let unlock_key = self.derive_unlock(password, &record.unlock_salt).await?;
        Ok(decrypt_key_set(record, &unlock_key)?)
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Run a memory-hard derivation on the blocking pool
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::KeyDerivation(format!("derivation task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_core::LocalSigner;
    use shade_storage_sqlite::MemoryVaultStore;
    use std::future::Future;
    use std::task::Poll;
    use std::time::Duration;

    const PASSWORD: &str = "Correct1!Password";

    fn manager() -> (KeyManager, Arc<MemoryVaultStore>) {
        let store = Arc::new(MemoryVaultStore::new());
        let manager = KeyManager::new(store.clone(), KeyManagerConfig::insecure_fast());
        (manager, store)
    }

    fn signer() -> LocalSigner {
        LocalSigner::from_bytes(&[0x11; 32]).unwrap()
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (manager, _) = manager();
        assert_eq!(manager.state(), KeyManagerState::Uninitialized);
        assert!(matches!(manager.get_keys(), Err(Error::Locked)));
        assert!(manager.account_id().is_none());
    }

    #[tokio::test]
    async fn test_lock_is_idempotent_and_keeps_identity() {
        let (manager, _) = manager();
        manager
            .initialize(PASSWORD, &signer(), "alice@example.com", "email")
            .await
            .unwrap();

        manager.lock().await;
        manager.lock().await;
        let status = manager.status();
        assert_eq!(status.state, KeyManagerState::Locked);
        assert_eq!(status.user_id.as_deref(), Some("alice@example.com"));
        assert!(status.is_initialized);
    }

    #[tokio::test]
    async fn test_weak_password_rejected_and_locked() {
        let (manager, store) = manager();
        let err = manager
            .initialize("short", &signer(), "alice@example.com", "email")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WeakPassword(_)));
        assert_eq!(manager.state(), KeyManagerState::Locked);
        assert!(!manager.status().is_initialized);
        assert!(store.accounts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_keys_blocks_nothing_after_release() {
        let (manager, _) = manager();
        manager
            .initialize(PASSWORD, &signer(), "alice@example.com", "email")
            .await
            .unwrap();

        {
            let keys = manager.get_keys().unwrap();
            assert!(keys.validate().is_ok());
        }
        manager.lock().await;
        assert!(manager.scan_keys().is_err());
    }

    #[tokio::test]
    async fn test_lock_zeroizes_key_material() {
        let (manager, _) = manager();
        manager
            .initialize(PASSWORD, &signer(), "alice@example.com", "email")
            .await
            .unwrap();
        assert!(!manager.get_keys().unwrap().is_zeroed());

        manager.lock().await;
        {
            let inner = manager.inner.read();
            assert_eq!(inner.last_wipe_zeroed, Some(true));
            assert!(inner.keys.is_none());
        }
        assert!(matches!(manager.get_keys(), Err(Error::Locked)));
        assert!(matches!(manager.scan_keys(), Err(Error::Locked)));
        assert!(!manager.status().is_unlocked);
    }

    #[tokio::test]
    async fn test_relock_during_unlock_reports_locked() {
        let (manager, _) = manager();
        let account = signer().account().checksum_hex();
        manager
            .initialize(PASSWORD, &signer(), "alice@example.com", "email")
            .await
            .unwrap();

        // Poll once: the old keys are gone and the derivation is running.
        let mut unlock = Box::pin(manager.unlock(PASSWORD, &account));
        let first = std::future::poll_fn(|cx| Poll::Ready(unlock.as_mut().poll(cx))).await;
        assert!(first.is_pending());
        assert_eq!(manager.state(), KeyManagerState::Locked);
        assert!(!manager.is_unlocked());
        assert!(!manager.status().is_unlocked);
        assert!(matches!(manager.get_keys(), Err(Error::Locked)));
        assert_eq!(manager.inner.read().last_wipe_zeroed, Some(true));

        unlock.await.unwrap();
        assert!(manager.is_unlocked());
        assert!(manager.get_keys().is_ok());
    }

    #[tokio::test]
    async fn test_abandoned_transitions_leave_locked() {
        let (manager, _) = manager();
        let account = signer().account().checksum_hex();

        // Abandoned at its first suspension point, inside the derivation.
        let abandoned = tokio::time::timeout(
            Duration::ZERO,
            manager.initialize(PASSWORD, &signer(), "alice@example.com", "email"),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(manager.state(), KeyManagerState::Locked);
        assert!(!manager.status().is_initialized);

        manager
            .initialize(PASSWORD, &signer(), "alice@example.com", "email")
            .await
            .unwrap();
        assert!(manager.is_unlocked());

        let abandoned =
            tokio::time::timeout(Duration::ZERO, manager.unlock(PASSWORD, &account)).await;
        assert!(abandoned.is_err());
        assert_eq!(manager.state(), KeyManagerState::Locked);
        assert!(manager.get_keys().is_err());

        manager.unlock(PASSWORD, &account).await.unwrap();
        assert!(manager.is_unlocked());
    }
}
