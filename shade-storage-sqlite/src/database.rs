//! Database connection and initialization

use crate::{migrations, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // journal_mode returns a row, so it cannot go through execute().
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL;", [], |row| row.get(0))?;
        tracing::debug!("Opened vault database at {} (journal_mode={})", path.as_ref().display(), mode);
        conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;

        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Private in-memory database, for tests and ephemeral sessions
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Get connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin transaction
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_database() {
        let file = NamedTempFile::new().unwrap();
        let db = Database::open(file.path()).unwrap();
        let count: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'vault_records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let file = NamedTempFile::new().unwrap();
        drop(Database::open(file.path()).unwrap());
        let db = Database::open(file.path()).unwrap();
        assert_eq!(
            migrations::get_schema_version(db.conn()).unwrap(),
            migrations::SCHEMA_VERSION
        );
    }
}
