//! Vault persistence
//!
//! [`VaultStore`] is the boundary the key manager writes through. Records are
//! keyed by account identifier; `save` overwrites.

use crate::database::Database;
use crate::models::{VaultAlgorithm, VaultIdentity, VaultRecord};
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// Persistence for encrypted key sets
pub trait VaultStore: Send + Sync {
    /// Whether a record exists for `account_id`
    fn exists(&self, account_id: &str) -> Result<bool>;

    /// Insert or replace the record for its account
    fn save(&self, record: &VaultRecord) -> Result<()>;

    /// Record for `account_id`, if any
    fn load(&self, account_id: &str) -> Result<Option<VaultRecord>>;

    /// Remove the record for `account_id`; returns whether one existed
    fn delete(&self, account_id: &str) -> Result<bool>;

    /// Every stored account identifier
    fn accounts(&self) -> Result<Vec<String>>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryVaultStore {
    records: RwLock<HashMap<String, VaultRecord>>,
}

impl MemoryVaultStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl VaultStore for MemoryVaultStore {
    fn exists(&self, account_id: &str) -> Result<bool> {
        Ok(self.records.read().contains_key(account_id))
    }

    fn save(&self, record: &VaultRecord) -> Result<()> {
        self.records
            .write()
            .insert(record.account_id().to_string(), record.clone());
        Ok(())
    }

    fn load(&self, account_id: &str) -> Result<Option<VaultRecord>> {
        Ok(self.records.read().get(account_id).cloned())
    }

    fn delete(&self, account_id: &str) -> Result<bool> {
        Ok(self.records.write().remove(account_id).is_some())
    }

    fn accounts(&self) -> Result<Vec<String>> {
        let mut accounts: Vec<String> = self.records.read().keys().cloned().collect();
        accounts.sort();
        Ok(accounts)
    }
}

/// SQLite-backed store
pub struct SqliteVaultStore {
    db: Mutex<Database>,
}

impl SqliteVaultStore {
    /// Open or create the vault database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Non-persistent SQLite store
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Wrap an open database
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
        Ok(StoredRow {
            account_id: row.get(0)?,
            version: row.get(1)?,
            algorithm: row.get(2)?,
            ciphertext: row.get(3)?,
            nonce: row.get(4)?,
            tag: row.get(5)?,
            master_salt: row.get(6)?,
            unlock_salt: row.get(7)?,
            user_id: row.get(8)?,
            auth_method: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

/// Row as stored, before base64 decoding
struct StoredRow {
    account_id: String,
    version: u8,
    algorithm: u8,
    ciphertext: String,
    nonce: String,
    tag: String,
    master_salt: String,
    unlock_salt: String,
    user_id: String,
    auth_method: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<StoredRow> for VaultRecord {
    type Error = Error;

    fn try_from(row: StoredRow) -> Result<Self> {
        Ok(VaultRecord {
            version: row.version,
            algorithm: VaultAlgorithm::from_byte(row.algorithm)?,
            ciphertext: STANDARD.decode(row.ciphertext)?,
            nonce: STANDARD.decode(row.nonce)?,
            tag: STANDARD.decode(row.tag)?,
            master_salt: STANDARD.decode(row.master_salt)?,
            unlock_salt: STANDARD.decode(row.unlock_salt)?,
            identity: VaultIdentity {
                account_id: row.account_id,
                user_id: row.user_id,
                auth_method: row.auth_method,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl VaultStore for SqliteVaultStore {
    fn exists(&self, account_id: &str) -> Result<bool> {
        let db = self.db.lock();
        let exists: bool = db.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM vault_records WHERE account_id = ?1)",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn save(&self, record: &VaultRecord) -> Result<()> {
        let mut db = self.db.lock();
        let tx = db.transaction()?;
        tx.execute(
            r#"
            INSERT INTO vault_records (
                account_id, version, algorithm, ciphertext, nonce, tag,
                master_salt, unlock_salt, user_id, auth_method, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(account_id) DO UPDATE SET
                version = excluded.version,
                algorithm = excluded.algorithm,
                ciphertext = excluded.ciphertext,
                nonce = excluded.nonce,
                tag = excluded.tag,
                master_salt = excluded.master_salt,
                unlock_salt = excluded.unlock_salt,
                user_id = excluded.user_id,
                auth_method = excluded.auth_method,
                updated_at = excluded.updated_at
            "#,
            params![
                record.account_id(),
                record.version,
                record.algorithm.as_byte(),
                STANDARD.encode(&record.ciphertext),
                STANDARD.encode(&record.nonce),
                STANDARD.encode(&record.tag),
                STANDARD.encode(&record.master_salt),
                STANDARD.encode(&record.unlock_salt),
                record.identity.user_id,
                record.identity.auth_method,
                record.created_at,
                record.updated_at,
            ],
        )?;
        tx.commit()?;

        tracing::debug!(account_id = %record.account_id(), "saved vault record");
        Ok(())
    }

    fn load(&self, account_id: &str) -> Result<Option<VaultRecord>> {
        let db = self.db.lock();
        let row = db
            .conn()
            .query_row(
                r#"
                SELECT account_id, version, algorithm, ciphertext, nonce, tag,
                       master_salt, unlock_salt, user_id, auth_method, created_at, updated_at
                FROM vault_records WHERE account_id = ?1
                "#,
                [account_id],
                Self::row_to_record,
            )
            .optional()?;

        row.map(VaultRecord::try_from).transpose()
    }

    fn delete(&self, account_id: &str) -> Result<bool> {
        let db = self.db.lock();
        let removed = db
            .conn()
            .execute("DELETE FROM vault_records WHERE account_id = ?1", [account_id])?;
        if removed > 0 {
            tracing::info!(account_id = %account_id, "deleted vault record");
        }
        Ok(removed > 0)
    }

    fn accounts(&self) -> Result<Vec<String>> {
        let db = self.db.lock();
        let mut stmt = db
            .conn()
            .prepare("SELECT account_id FROM vault_records ORDER BY account_id")?;
        let accounts = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(accounts)
    }
}
