use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::info;

use crate::error::TtPulseError;
use crate::schema::CREATE_SCHEMA_SQL;

const DB_FILENAME: &str = "ttpulse.db";
const SCHEMA_VERSION: &str = "1";

/// Shared handle to the sqlite store. The connection sits behind a mutex so
/// the watchdog thread and interactive commands can use one database; each
/// storage operation is a short read-then-write under the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(db_folder: &Path) -> Result<Self, TtPulseError> {
        std::fs::create_dir_all(db_folder)?;
        let db_path = db_folder.join(DB_FILENAME);

        let conn = Connection::open(&db_path)?;
        info!("Database opened at: {}", db_path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_schema()?;

        Ok(db)
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn ensure_schema(&self) -> Result<(), TtPulseError> {
        let conn = self.conn();

        let table_exists: bool = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='meta'",
                [],
                |row| row.get::<_, i32>(0),
            )
            .map(|count| count > 0)
            .unwrap_or(false);

        if !table_exists {
            conn.execute_batch(CREATE_SCHEMA_SQL)?;
            return Ok(());
        }

        let stored_version: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored_version.as_deref() {
            Some(SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(TtPulseError::Error(format!(
                "Schema version mismatch: found '{other}', expected '{SCHEMA_VERSION}'"
            ))),
            None => Err(TtPulseError::Error("Schema version missing".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        let version: String = db
            .conn()
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn reopen_accepts_current_schema() {
        let dir = tempdir().unwrap();
        drop(Database::open(dir.path()).unwrap());
        assert!(Database::open(dir.path()).is_ok());
    }

    #[test]
    fn reopen_rejects_version_mismatch() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.conn()
                .execute(
                    "UPDATE meta SET value = '999' WHERE key = 'schema_version'",
                    [],
                )
                .unwrap();
        }
        assert!(Database::open(dir.path()).is_err());
    }
}
