//! Database schema migrations

use crate::{Error, Result};
use rusqlite::Connection;

/// Latest schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        "Running migrations: current_version={}, target_version={}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version > SCHEMA_VERSION {
        return Err(Error::Migration(format!(
            "database schema {} is newer than supported {}",
            current_version, SCHEMA_VERSION
        )));
    }

    if current_version < 1 {
        migrate_v1(conn)?;
        set_schema_version(conn, 1)?;
    }

    Ok(())
}

/// Current schema version, 0 for a fresh database.
///
/// Only a missing `schema_version` table counts as fresh; any other failure
/// to read it is returned.
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }

    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tracing::debug!("Schema version {} recorded", version);
    Ok(())
}

/// Vault records, binary fields as base64 text
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS vault_records (
            account_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            algorithm INTEGER NOT NULL,
            ciphertext TEXT NOT NULL,
            nonce TEXT NOT NULL,
            tag TEXT NOT NULL,
            master_salt TEXT NOT NULL,
            unlock_salt TEXT NOT NULL,
            user_id TEXT NOT NULL,
            auth_method TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_vault_records_user ON vault_records(user_id);
        "#,
    )
    .map_err(|e| Error::Migration(format!("v1: {}", e)))
}
