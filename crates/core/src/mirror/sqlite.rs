//! SQLite-backed mirror, readable by other processes through the database file.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::{MirrorEntry, MirrorError, QueueMirror};
use crate::cursor::Uid;

/// SQLite-backed mirror.
pub struct SqliteMirror {
    conn: Mutex<Connection>,
}

impl SqliteMirror {
    /// Open (or create) the mirror database at `path`.
    pub fn new(path: &Path) -> Result<Self, MirrorError> {
        let conn = Connection::open(path).map_err(|e| MirrorError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite mirror (useful for testing).
    pub fn in_memory() -> Result<Self, MirrorError> {
        let conn =
            Connection::open_in_memory().map_err(|e| MirrorError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), MirrorError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS queue_mirror (
                uid INTEGER PRIMARY KEY,
                business TEXT NOT NULL,
                subject TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| MirrorError::Storage(e.to_string()))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, MirrorError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MirrorError::Storage(format!("lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| MirrorError::Storage(e.to_string()))
    }
}

#[async_trait]
impl QueueMirror for SqliteMirror {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, entry: MirrorEntry) -> Result<(), MirrorError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO queue_mirror (uid, business, subject) VALUES (?1, ?2, ?3)",
                params![entry.uid, entry.business, entry.subject],
            )
            .map(|_| ())
        })
    }

    async fn remove(&self, uid: Uid) -> Result<(), MirrorError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM queue_mirror WHERE uid = ?1", params![uid])
                .map(|_| ())
        })
    }

    async fn list_all(&self) -> Result<Vec<MirrorEntry>, MirrorError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT uid, business, subject FROM queue_mirror ORDER BY uid")?;
            let rows = stmt.query_map([], |row| {
                Ok(MirrorEntry {
                    uid: row.get(0)?,
                    business: row.get(1)?,
                    subject: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }

    async fn len(&self) -> Result<usize, MirrorError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM queue_mirror", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
        })
    }
}
