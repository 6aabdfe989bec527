//! Session directory
//!
//! Sessions are named epochs in an environment's timeline, totally ordered
//! by `created_at`. They are immutable once created and never deleted; the
//! current session is simply the one with the greatest `created_at`.

use super::{Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::Serialize;

/// A session row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub name: String,
    pub created_at: i64,
}

/// Autogenerated session name derived from the creation timestamp, e.g.
/// `[2026-08-06T12:00:00.123Z::456]`. Unique as long as `created_at`
/// values are (which the clock source guarantees per process).
pub fn generate_session_name(created_at_micros: i64) -> String {
    let millis = created_at_micros.div_euclid(1000);
    let micros_only = created_at_micros.rem_euclid(1000);
    let datetime = DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    format!(
        "[{}::{}]",
        datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        micros_only
    )
}

impl Store {
    /// Create a session. Fails if the name already exists in the
    /// environment.
    pub async fn create_session(
        &self,
        environment_key: String,
        name: String,
        created_at: i64,
    ) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO sessions (environment_key, name, created_at)
                 VALUES (?1, ?2, ?3)",
                params![environment_key, name, created_at],
            )?;
            Ok(())
        })
        .await
    }

    /// List sessions ascending by creation time, with optional inclusive
    /// bounds on `created_at`.
    pub async fn list_sessions(
        &self,
        environment_key: String,
        created_after: Option<i64>,
        created_before: Option<i64>,
    ) -> Result<Vec<SessionRow>, StoreError> {
        self.run_blocking(move |conn| {
            let mut sql =
                String::from("SELECT name, created_at FROM sessions WHERE environment_key = ?");
            let mut args: Vec<&dyn ToSql> = vec![&environment_key];
            if let Some(ref after) = created_after {
                sql.push_str(" AND created_at >= ?");
                args.push(after);
            }
            if let Some(ref before) = created_before {
                sql.push_str(" AND created_at <= ?");
                args.push(before);
            }
            sql.push_str(" ORDER BY created_at ASC");

            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(&args[..], |row| {
                    Ok(SessionRow {
                        name: row.get(0)?,
                        created_at: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// The session with the greatest `created_at`, if any.
    pub async fn current_session(
        &self,
        environment_key: String,
    ) -> Result<Option<SessionRow>, StoreError> {
        self.run_blocking(move |conn| current_session_sync(conn, &environment_key)).await
    }

    /// Look up a session by name.
    pub async fn session_by_name(
        &self,
        environment_key: String,
        name: String,
    ) -> Result<Option<SessionRow>, StoreError> {
        self.run_blocking(move |conn| {
            let row = conn
                .query_row(
                    "SELECT name, created_at FROM sessions
                     WHERE environment_key = ?1 AND name = ?2",
                    params![environment_key, name],
                    |row| {
                        Ok(SessionRow {
                            name: row.get(0)?,
                            created_at: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    /// `created_at` of the earliest session after the given one, if any.
    /// Determines the inclusive upper edge of a session's time range.
    pub async fn next_session_created_at(
        &self,
        environment_key: String,
        after: i64,
    ) -> Result<Option<i64>, StoreError> {
        self.run_blocking(move |conn| {
            let created_at = conn
                .query_row(
                    "SELECT created_at FROM sessions
                     WHERE environment_key = ?1 AND created_at > ?2
                     ORDER BY created_at ASC LIMIT 1",
                    params![environment_key, after],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(created_at)
        })
        .await
    }

    /// Return the environment's current session, creating one with the
    /// given candidate name/timestamp if none exists yet.
    ///
    /// Race policy: attempt an `INSERT OR IGNORE`, then re-fetch. Concurrent
    /// first-writers may both attempt the insert; the unique constraint
    /// drops the loser and both observe a consistent current session.
    pub async fn get_or_create_current_session(
        &self,
        environment_key: String,
        candidate_name: String,
        candidate_created_at: i64,
    ) -> Result<SessionRow, StoreError> {
        self.run_blocking(move |conn| {
            if let Some(session) = current_session_sync(conn, &environment_key)? {
                return Ok(session);
            }
            conn.execute(
                "INSERT OR IGNORE INTO sessions (environment_key, name, created_at)
                 VALUES (?1, ?2, ?3)",
                params![environment_key, candidate_name, candidate_created_at],
            )?;
            current_session_sync(conn, &environment_key)?
                .ok_or_else(|| StoreError::Runtime("session vanished after create".to_string()))
        })
        .await
    }
}

fn current_session_sync(
    conn: &Connection,
    environment_key: &str,
) -> Result<Option<SessionRow>, StoreError> {
    let row = conn
        .query_row(
            "SELECT name, created_at FROM sessions
             WHERE environment_key = ?1
             ORDER BY created_at DESC LIMIT 1",
            params![environment_key],
            |row| {
                Ok(SessionRow {
                    name: row.get(0)?,
                    created_at: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
