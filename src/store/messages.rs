//! Message persistence and cursor-based retrieval
//!
//! Messages have no idempotency key: every post is a new row with a
//! server-assigned timestamp. Readers consume them by asking for the next
//! row strictly after a cursor, so a message at `ts = X` is never handed out
//! twice to a reader that advances its cursor to `X`.

use super::{Store, StoreError};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// How to match the stored full path.
#[derive(Debug, Clone)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
}

/// A message as returned to path-scoped readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRow {
    pub ts: i64,
    pub data: JsonValue,
}

/// A message as returned by the global tail, full path included.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalMessageRow {
    pub environment_key: String,
    pub path: String,
    pub ts: i64,
    pub data: JsonValue,
}

impl Store {
    /// Append a message under its full (instance-prefixed) path.
    pub async fn insert_message(
        &self,
        environment_key: String,
        path: String,
        ts: i64,
        data: JsonValue,
    ) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            let data = serde_json::to_string(&data)?;
            conn.execute(
                "INSERT INTO messages (environment_key, path, ts, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![environment_key, path, ts, data],
            )?;
            Ok(())
        })
        .await
    }

    /// The earliest message on a path with `ts` strictly greater than
    /// `after_ts` (unbounded when `None`).
    pub async fn next_message(
        &self,
        environment_key: String,
        path: PathMatch,
        after_ts: Option<i64>,
    ) -> Result<Option<MessageRow>, StoreError> {
        self.run_blocking(move |conn| {
            let cursor = after_ts.unwrap_or(i64::MIN);
            let (path_clause, path_arg) = match path {
                PathMatch::Exact(p) => ("path = ?2", p),
                PathMatch::Prefix(p) => ("path LIKE ?2 ESCAPE '\\'", like_prefix(&p)),
            };
            let sql = format!(
                "SELECT ts, data FROM messages
                 WHERE environment_key = ?1 AND {path_clause} AND ts > ?3
                 ORDER BY ts ASC LIMIT 1"
            );
            let row = conn
                .query_row(&sql, params![environment_key, path_arg, cursor], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .optional()?;

            row.map(|(ts, data)| {
                Ok(MessageRow {
                    ts,
                    data: serde_json::from_str(&data)?,
                })
            })
            .transpose()
        })
        .await
    }

    /// The earliest message across all environments and paths with `ts`
    /// strictly greater than `after_ts`.
    pub async fn next_message_global(
        &self,
        after_ts: Option<i64>,
    ) -> Result<Option<GlobalMessageRow>, StoreError> {
        self.run_blocking(move |conn| {
            let cursor = after_ts.unwrap_or(i64::MIN);
            let row = conn
                .query_row(
                    "SELECT environment_key, path, ts, data FROM messages
                     WHERE ts > ?1 ORDER BY ts ASC LIMIT 1",
                    params![cursor],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(environment_key, path, ts, data)| {
                Ok(GlobalMessageRow {
                    environment_key,
                    path,
                    ts,
                    data: serde_json::from_str(&data)?,
                })
            })
            .transpose()
        })
        .await
    }
}

/// Escape LIKE metacharacters in a literal prefix and append the wildcard.
fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> Store {
        Store::open(None).await.expect("open store")
    }

    #[tokio::test]
    async fn cursor_tailing_never_repeats() {
        let store = store().await;
        for (ts, data) in [(10, "one"), (20, "two"), (30, "three")] {
            store
                .insert_message("env".into(), "node/foo".into(), ts, json!(data))
                .await
                .expect("insert");
        }

        let first = store
            .next_message("env".into(), PathMatch::Exact("node/foo".into()), None)
            .await
            .expect("next")
            .expect("some");
        assert_eq!(first, MessageRow { ts: 10, data: json!("one") });

        let second = store
            .next_message("env".into(), PathMatch::Exact("node/foo".into()), Some(first.ts))
            .await
            .expect("next")
            .expect("some");
        assert_eq!(second.ts, 20);

        let done = store
            .next_message("env".into(), PathMatch::Exact("node/foo".into()), Some(30))
            .await
            .expect("next");
        assert_eq!(done, None);
    }

    #[tokio::test]
    async fn prefix_match_scopes_by_namespace() {
        let store = store().await;
        store
            .insert_message("env".into(), "node/valves/main".into(), 10, json!(1))
            .await
            .expect("insert");
        store
            .insert_message("env".into(), "node/valves/aux".into(), 20, json!(2))
            .await
            .expect("insert");
        store
            .insert_message("env".into(), "other/valves/main".into(), 5, json!(3))
            .await
            .expect("insert");

        let next = store
            .next_message("env".into(), PathMatch::Prefix("node/valves/".into()), None)
            .await
            .expect("next")
            .expect("some");
        assert_eq!(next.ts, 10);

        let exact_misses_children = store
            .next_message("env".into(), PathMatch::Exact("node/valves".into()), None)
            .await
            .expect("next");
        assert_eq!(exact_misses_children, None);
    }

    #[tokio::test]
    async fn like_metacharacters_are_literal() {
        let store = store().await;
        store
            .insert_message("env".into(), "node/100%_done/x".into(), 10, json!(1))
            .await
            .expect("insert");
        store
            .insert_message("env".into(), "node/100Xdone/x".into(), 5, json!(2))
            .await
            .expect("insert");

        // '%' and '_' in the prefix must not act as wildcards.
        let next = store
            .next_message("env".into(), PathMatch::Prefix("node/100%_done/".into()), None)
            .await
            .expect("next")
            .expect("some");
        assert_eq!(next.ts, 10);
    }

    #[tokio::test]
    async fn global_tail_spans_environments() {
        let store = store().await;
        store
            .insert_message("env-b".into(), "node/b".into(), 20, json!("b"))
            .await
            .expect("insert");
        store
            .insert_message("env-a".into(), "node/a".into(), 10, json!("a"))
            .await
            .expect("insert");

        let first = store.next_message_global(None).await.expect("next").expect("some");
        assert_eq!(first.environment_key, "env-a");
        assert_eq!(first.ts, 10);

        let second = store
            .next_message_global(Some(first.ts))
            .await
            .expect("next")
            .expect("some");
        assert_eq!(second.environment_key, "env-b");

        assert_eq!(store.next_message_global(Some(20)).await.expect("next"), None);
    }

    #[test]
    fn like_prefix_escaping() {
        assert_eq!(like_prefix("a/b"), "a/b%");
        assert_eq!(like_prefix("a%b_c\\d"), "a\\%b\\_c\\\\d%");
    }
}
