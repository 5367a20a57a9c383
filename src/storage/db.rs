//! Database operations.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite database wrapper holding named key material.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at path.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run migrations.
    fn migrate(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(include_str!("schema.sql"))
    }

    /// Read the value stored under `name`.
    pub fn get(&self, name: &str) -> rusqlite::Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM key_material WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
    }

    /// Apply a set of writes atomically. `None` deletes the entry.
    pub fn apply(&mut self, changes: &[(&str, Option<String>)]) -> rusqlite::Result<()> {
        let now = Utc::now().timestamp_millis();
        let tx = self.conn.transaction()?;
        for (name, value) in changes {
            match value {
                Some(value) => {
                    tx.execute(
                        "INSERT INTO key_material (name, value, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(name) DO UPDATE
                         SET value = excluded.value, updated_at = excluded.updated_at",
                        params![name, value, now],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM key_material WHERE name = ?1", params![name])?;
                }
            }
        }
        tx.commit()
    }
}
