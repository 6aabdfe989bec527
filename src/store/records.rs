//! Record persistence and retrieval
//!
//! Records are append-only and idempotent on `(environment_key, device, ts)`:
//! a colliding write is silently dropped and the first payload wins. The
//! only mutation ever applied is flipping `sent_to_parent` after the sync
//! worker gets a parent acknowledgment.

use super::{Store, StoreError};
use crate::query::TimeWindow;
use rusqlite::{params, ToSql};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A record to insert.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub environment_key: String,
    pub device: String,
    pub ts: i64,
    pub data: JsonValue,
}

/// A record as returned to query callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRow {
    pub ts: i64,
    pub data: JsonValue,
}

/// An unsent record as paged by the sync worker.
#[derive(Debug, Clone)]
pub struct UnsentRecord {
    pub received_at_index: i64,
    pub environment_key: String,
    pub device: String,
    pub ts: i64,
    pub data: JsonValue,
}

impl Store {
    /// Insert records, silently skipping rows whose
    /// `(environment_key, device, ts)` key already exists. Elements of a
    /// batch succeed or are dropped independently. Returns the number of
    /// rows actually inserted.
    pub async fn insert_records(&self, rows: Vec<NewRecord>) -> Result<usize, StoreError> {
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO records (environment_key, device, ts, data)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for row in rows {
                    let data = serde_json::to_string(&row.data)?;
                    inserted +=
                        stmt.execute(params![row.environment_key, row.device, row.ts, data])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    /// Range query over one device's records. Bounds are inclusive;
    /// `ascending` selects earliest-first vs latest-first ordering.
    pub async fn list_records(
        &self,
        environment_key: String,
        device: String,
        window: TimeWindow,
        ascending: bool,
        limit: Option<i64>,
    ) -> Result<Vec<RecordRow>, StoreError> {
        self.run_blocking(move |conn| {
            let mut sql = String::from(
                "SELECT ts, data FROM records WHERE environment_key = ? AND device = ?",
            );
            let mut args: Vec<&dyn ToSql> = vec![&environment_key, &device];
            if let Some(ref start) = window.start {
                sql.push_str(" AND ts >= ?");
                args.push(start);
            }
            if let Some(ref end) = window.end {
                sql.push_str(" AND ts <= ?");
                args.push(end);
            }
            sql.push_str(if ascending {
                " ORDER BY ts ASC"
            } else {
                " ORDER BY ts DESC"
            });
            // SQLite treats a negative LIMIT as "no limit".
            let limit = limit.unwrap_or(-1);
            sql.push_str(" LIMIT ?");
            args.push(&limit);

            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(&args[..], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(ts, data)| {
                    Ok(RecordRow {
                        ts,
                        data: serde_json::from_str(&data)?,
                    })
                })
                .collect()
        })
        .await
    }

    /// The single most recent record for a device within a time window.
    pub async fn latest_record(
        &self,
        environment_key: String,
        device: String,
        window: TimeWindow,
    ) -> Result<Option<RecordRow>, StoreError> {
        let mut rows = self
            .list_records(environment_key, device, window, false, Some(1))
            .await?;
        Ok(rows.pop())
    }

    /// Page the newest unsent records, newest first by receipt index.
    pub async fn fetch_unsent(&self, limit: i64) -> Result<Vec<UnsentRecord>, StoreError> {
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT received_at_index, environment_key, device, ts, data
                 FROM records WHERE sent_to_parent = 0
                 ORDER BY received_at_index DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(received_at_index, environment_key, device, ts, data)| {
                    Ok(UnsentRecord {
                        received_at_index,
                        environment_key,
                        device,
                        ts,
                        data: serde_json::from_str(&data)?,
                    })
                })
                .collect()
        })
        .await
    }

    /// Mark exactly the given receipt indexes as sent to the parent.
    ///
    /// Only rows still unsent are touched; a row created between the sync
    /// worker's fetch and this call keeps `sent_to_parent = 0` even when its
    /// index falls inside the fetched span, and ships on a later pass.
    /// Returns the number of rows flipped.
    pub async fn mark_sent(&self, indexes: Vec<i64>) -> Result<usize, StoreError> {
        if indexes.is_empty() {
            return Ok(0);
        }
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;
            let mut marked = 0;
            // Chunked to stay well under the SQLite bound-parameter cap.
            for chunk in indexes.chunks(500) {
                let placeholders = vec!["?"; chunk.len()].join(",");
                let sql = format!(
                    "UPDATE records SET sent_to_parent = 1
                     WHERE sent_to_parent = 0 AND received_at_index IN ({placeholders})"
                );
                let args: Vec<&dyn ToSql> = chunk.iter().map(|i| i as &dyn ToSql).collect();
                marked += tx.execute(&sql, &args[..])?;
            }
            tx.commit()?;
            Ok(marked)
        })
        .await
    }

    /// Total and sent-to-parent record counts, for the sync status endpoint.
    pub async fn record_counts(&self) -> Result<(i64, i64), StoreError> {
        self.run_blocking(|conn| {
            let counts = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(sent_to_parent), 0) FROM records",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )?;
            Ok(counts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(env: &str, device: &str, ts: i64, data: JsonValue) -> NewRecord {
        NewRecord {
            environment_key: env.into(),
            device: device.into(),
            ts,
            data,
        }
    }

    async fn store() -> Store {
        Store::open(None).await.expect("open store")
    }

    #[tokio::test]
    async fn first_write_wins() {
        let store = store().await;
        store
            .insert_records(vec![record("env", "foo", 100, json!({"a": 1}))])
            .await
            .expect("insert");
        let inserted = store
            .insert_records(vec![record("env", "foo", 100, json!({"a": 2}))])
            .await
            .expect("insert");
        assert_eq!(inserted, 0);

        let rows = store
            .list_records("env".into(), "foo".into(), TimeWindow::default(), false, None)
            .await
            .expect("list");
        assert_eq!(rows, vec![RecordRow { ts: 100, data: json!({"a": 1}) }]);
    }

    #[tokio::test]
    async fn batch_skips_duplicates_independently() {
        let store = store().await;
        store
            .insert_records(vec![record("env", "foo", 200, json!("existing"))])
            .await
            .expect("seed");

        let inserted = store
            .insert_records(vec![
                record("env", "foo", 100, json!("new")),
                record("env", "foo", 200, json!("dropped")),
                record("env", "foo", 300, json!("new")),
            ])
            .await
            .expect("batch");
        assert_eq!(inserted, 2);

        let rows = store
            .list_records("env".into(), "foo".into(), TimeWindow::default(), true, None)
            .await
            .expect("list");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].data, json!("existing"));
    }

    #[tokio::test]
    async fn window_bounds_are_inclusive() {
        let store = store().await;
        store
            .insert_records(vec![
                record("env", "foo", 100, json!(1)),
                record("env", "foo", 150, json!(2)),
                record("env", "foo", 200, json!(3)),
            ])
            .await
            .expect("insert");

        let window = TimeWindow {
            start: Some(100),
            end: Some(200),
        };
        let rows = store
            .list_records("env".into(), "foo".into(), window, true, None)
            .await
            .expect("list");
        assert_eq!(rows.iter().map(|r| r.ts).collect::<Vec<_>>(), vec![100, 150, 200]);

        // Inverted window matches nothing.
        let inverted = TimeWindow {
            start: Some(200),
            end: Some(100),
        };
        let rows = store
            .list_records("env".into(), "foo".into(), inverted, true, None)
            .await
            .expect("list");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn environments_are_disjoint() {
        let store = store().await;
        store
            .insert_records(vec![
                record("env-a", "foo", 100, json!(1)),
                record("env-b", "foo", 100, json!(2)),
            ])
            .await
            .expect("insert");

        let rows = store
            .list_records("env-a".into(), "foo".into(), TimeWindow::default(), true, None)
            .await
            .expect("list");
        assert_eq!(rows, vec![RecordRow { ts: 100, data: json!(1) }]);
    }

    #[tokio::test]
    async fn receipt_index_increases_and_orders_unsent() {
        let store = store().await;
        for ts in [300, 100, 200] {
            store
                .insert_records(vec![record("env", "foo", ts, json!(ts))])
                .await
                .expect("insert");
        }

        let unsent = store.fetch_unsent(10).await.expect("fetch");
        // Newest receipt first, regardless of ts ordering.
        let indexes: Vec<i64> = unsent.iter().map(|r| r.received_at_index).collect();
        assert_eq!(unsent.iter().map(|r| r.ts).collect::<Vec<_>>(), vec![200, 100, 300]);
        assert!(indexes.windows(2).all(|w| w[0] > w[1]));

        let limited = store.fetch_unsent(2).await.expect("fetch");
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].received_at_index, indexes[0]);
    }

    #[tokio::test]
    async fn mark_sent_touches_exactly_the_snapshot() {
        let store = store().await;
        for ts in [1, 2, 3] {
            store
                .insert_records(vec![record("env", "foo", ts, json!(ts))])
                .await
                .expect("insert");
        }
        let unsent = store.fetch_unsent(10).await.expect("fetch");
        let all: Vec<i64> = unsent.iter().map(|r| r.received_at_index).collect();

        // Mark the outer two; the middle row sits inside the span but is
        // not in the snapshot, so it must stay unsent.
        let snapshot = vec![all[0], all[2]];
        let marked = store.mark_sent(snapshot).await.expect("mark");
        assert_eq!(marked, 2);

        let remaining = store.fetch_unsent(10).await.expect("fetch");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].received_at_index, all[1]);

        // Re-marking already-sent rows is a no-op.
        let marked = store.mark_sent(all).await.expect("mark");
        assert_eq!(marked, 1);
        assert_eq!(store.record_counts().await.expect("counts"), (3, 3));
    }

    #[tokio::test]
    async fn latest_record_respects_upper_bound() {
        let store = store().await;
        store
            .insert_records(vec![
                record("env", "foo", 100, json!("old")),
                record("env", "foo", 200, json!("new")),
            ])
            .await
            .expect("insert");

        let latest = store
            .latest_record("env".into(), "foo".into(), TimeWindow::default())
            .await
            .expect("latest");
        assert_eq!(latest, Some(RecordRow { ts: 200, data: json!("new") }));

        let bounded = store
            .latest_record(
                "env".into(),
                "foo".into(),
                TimeWindow { start: None, end: Some(100) },
            )
            .await
            .expect("latest");
        assert_eq!(bounded, Some(RecordRow { ts: 100, data: json!("old") }));

        let missing = store
            .latest_record("env".into(), "nope".into(), TimeWindow::default())
            .await
            .expect("latest");
        assert_eq!(missing, None);
    }
}
