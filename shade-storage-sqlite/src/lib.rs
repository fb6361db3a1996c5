//! Encrypted key vault for Shade
//!
//! Seals a wallet key set under a password-derived unlock key and persists
//! the resulting record through the [`VaultStore`] boundary.
//!
//! ## Security Features
//!
//! - **Authenticated encryption**: AES-256-GCM (default) or ChaCha20-Poly1305
//! - **Owner binding**: account, user and auth method are associated data
//! - **No key persistence**: only ciphertext and salts reach storage
//! - **Text-safe storage**: binary fields stored as base64 in SQLite

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod database;
pub mod error;
pub mod migrations;
pub mod models;
pub mod security;
pub mod vault;

pub use database::Database;
pub use error::{Error, Result};
pub use models::{VaultAlgorithm, VaultIdentity, VaultRecord};
pub use security::{decrypt_key_set, encrypt_key_set, rekey_record};
pub use vault::{MemoryVaultStore, SqliteVaultStore, VaultStore};
