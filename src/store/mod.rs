//! SQLite-backed persistence layer
//!
//! The storage engine is consumed through a deliberately small contract:
//! idempotent insert (`INSERT OR IGNORE`), indexed range queries, a strictly
//! increasing receipt counter (`AUTOINCREMENT` rowid), and conditional
//! updates. A single connection behind a mutex is serialized per statement;
//! every call hops to the blocking pool so handlers and the sync worker never
//! block the async runtime.

mod messages;
mod records;
mod sessions;

pub use messages::{GlobalMessageRow, MessageRow, PathMatch};
pub use records::{NewRecord, RecordRow, UnsentRecord};
pub use sessions::{generate_session_name, SessionRow};

use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Runtime(String),
}

/// Handle to the node's local store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (and migrate) the store at `path`, or an in-memory store when
    /// `path` is `None`.
    pub async fn open(path: Option<PathBuf>) -> Result<Self, StoreError> {
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, rusqlite::Error> {
            let conn = match path {
                Some(path) => Connection::open(path)?,
                None => Connection::open_in_memory()?,
            };
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            init_schema(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Runtime(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    pub(crate) async fn run_blocking<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("store connection lock poisoned");
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Runtime(e.to_string()))?
    }
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
             received_at_index INTEGER PRIMARY KEY AUTOINCREMENT,
             environment_key   TEXT    NOT NULL,
             device            TEXT    NOT NULL,
             ts                INTEGER NOT NULL,
             data              TEXT    NOT NULL,
             sent_to_parent    INTEGER NOT NULL DEFAULT 0,
             UNIQUE (environment_key, device, ts)
         );
         CREATE INDEX IF NOT EXISTS idx_records_unsent
             ON records (sent_to_parent, received_at_index);

         CREATE TABLE IF NOT EXISTS messages (
             id              INTEGER PRIMARY KEY AUTOINCREMENT,
             environment_key TEXT    NOT NULL,
             path            TEXT    NOT NULL,
             ts              INTEGER NOT NULL,
             data            TEXT    NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_messages_env_path_ts
             ON messages (environment_key, path, ts);
         CREATE INDEX IF NOT EXISTS idx_messages_ts
             ON messages (ts);

         CREATE TABLE IF NOT EXISTS sessions (
             environment_key TEXT    NOT NULL,
             name            TEXT    NOT NULL,
             created_at      INTEGER NOT NULL,
             PRIMARY KEY (environment_key, name)
         );
         CREATE INDEX IF NOT EXISTS idx_sessions_env_created
             ON sessions (environment_key, created_at);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_and_reopen_schema() {
        // Schema creation is idempotent.
        let store = Store::open(None).await.expect("open");
        store
            .run_blocking(|conn| init_schema(conn).map_err(StoreError::from))
            .await
            .expect("re-init");
    }

    #[tokio::test]
    async fn open_on_disk_persists_counter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("node.db");

        let store = Store::open(Some(path.clone())).await.expect("open");
        store
            .insert_records(vec![NewRecord {
                environment_key: "env".into(),
                device: "dev".into(),
                ts: 1,
                data: serde_json::json!(1),
            }])
            .await
            .expect("insert");
        drop(store);

        // The receipt counter survives a reopen: AUTOINCREMENT never reuses
        // indexes, so replication cursors stay valid across restarts.
        let store = Store::open(Some(path)).await.expect("reopen");
        store
            .insert_records(vec![NewRecord {
                environment_key: "env".into(),
                device: "dev".into(),
                ts: 2,
                data: serde_json::json!(2),
            }])
            .await
            .expect("insert");

        let unsent = store.fetch_unsent(10).await.expect("fetch");
        assert_eq!(unsent.len(), 2);
        assert!(unsent[0].received_at_index > unsent[1].received_at_index);
    }
}
