//! Background sync worker
//!
//! Two independent unbounded loops run for the process lifetime: one drains
//! unsent records upstream in batches, one tails the parent's message feed
//! one entry at a time. A loop iteration either completes its unit of work
//! or logs the failure and waits for the next tick; nothing terminates the
//! loops and nothing is marked sent without a parent acknowledgment.

use super::parent::{GlobalRecord, ParentClient, ParentError};
use crate::clock::unix_millis_now;
use crate::state::AppState;
use crate::store::StoreError;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const SYNC_RECORDS_DELAY: Duration = Duration::from_millis(50);
const SYNC_MESSAGES_DELAY: Duration = Duration::from_millis(100);

/// If no record was received in the last 30s, switch to high-throughput +
/// high-latency offline sync mode. Otherwise, perform live sync
/// (low-throughput + low-latency).
const LIVE_THRESHOLD_MS: i64 = 30_000;

const LIVE_SYNC_RECORD_BATCH_SIZE: i64 = 100;
const OFFLINE_SYNC_RECORD_BATCH_SIZE: i64 = 3000;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Parent(#[from] ParentError),
}

/// Whether a record was received recently enough to prefer low-latency
/// small batches over backlog-draining large ones.
fn is_live(last_received_ms: Option<i64>, now_ms: i64) -> bool {
    match last_received_ms {
        None => false,
        Some(received) => now_ms - received < LIVE_THRESHOLD_MS,
    }
}

/// Replicates this node's store to its configured parent.
pub struct SyncWorker {
    state: Arc<AppState>,
    parent: ParentClient,

    /// Message tail cursor, unix microseconds. Initialized to "now" at
    /// construction: a fresh worker tails forward only, it does not
    /// backfill messages the parent already holds.
    last_synced_message_ts: AtomicI64,

    // Previous-iteration state, only for edge-triggered logging.
    was_live: AtomicBool,
    records_up_to_date: AtomicBool,
    messages_up_to_date: AtomicBool,
}

impl SyncWorker {
    pub fn new(state: Arc<AppState>, parent: ParentClient) -> Self {
        let now = state.clock.now_micros();
        Self {
            state,
            parent,
            last_synced_message_ts: AtomicI64::new(now),
            was_live: AtomicBool::new(false),
            records_up_to_date: AtomicBool::new(true),
            messages_up_to_date: AtomicBool::new(true),
        }
    }

    /// Spawn the worker as a background tokio task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run both sync loops until the process exits.
    pub async fn run(&self) {
        tracing::info!(parent = %self.parent.base_url(), "started sync worker");
        tokio::join!(self.record_loop(), self.message_loop());
    }

    async fn record_loop(&self) {
        loop {
            if let Err(error) = self.sync_records_once().await {
                tracing::warn!(error = %error, "record sync iteration failed");
            }
            tokio::time::sleep(SYNC_RECORDS_DELAY).await;
        }
    }

    async fn message_loop(&self) {
        loop {
            if let Err(error) = self.sync_messages_once().await {
                tracing::warn!(error = %error, "message sync iteration failed");
            }
            tokio::time::sleep(SYNC_MESSAGES_DELAY).await;
        }
    }

    /// One record-sync unit of work: fetch the newest unsent rows, ship
    /// them as a single global batch, then mark exactly those rows sent.
    ///
    /// On any failure the whole unit fails with no state mutated; the
    /// fetched rows stay unsent and are retried on the next tick.
    pub async fn sync_records_once(&self) -> Result<(), SyncError> {
        let live = self.should_live_sync();
        self.note_live_mode(live);

        let batch_size = if live {
            LIVE_SYNC_RECORD_BATCH_SIZE
        } else {
            OFFLINE_SYNC_RECORD_BATCH_SIZE
        };
        // Newest-unsent-first in both modes: recency keeps the parent's
        // live view fresh even while draining a backlog.
        let batch = self.state.store.fetch_unsent(batch_size).await?;
        self.note_records_up_to_date(batch.is_empty());
        if batch.is_empty() {
            return Ok(());
        }

        let indexes: Vec<i64> = batch.iter().map(|r| r.received_at_index).collect();
        let records: Vec<GlobalRecord> = batch
            .into_iter()
            .map(|r| GlobalRecord {
                environment_key: r.environment_key,
                device: r.device,
                ts: r.ts,
                data: r.data,
            })
            .collect();

        self.parent.post_records_batch(&records).await?;

        let marked = self.state.store.mark_sent(indexes).await?;
        tracing::debug!(marked, live, "marked records as sent to parent");
        Ok(())
    }

    /// One message-sync unit of work: tail a single message from the
    /// parent, ingest it locally under this node's addressing, advance the
    /// cursor. One message per iteration — messages are low-volume,
    /// latency-sensitive control signals.
    pub async fn sync_messages_once(&self) -> Result<(), SyncError> {
        let cursor = self.last_synced_message_ts.load(Ordering::Acquire);
        let next = self.parent.next_message(cursor).await?;
        self.note_messages_up_to_date(next.is_none());

        let Some(message) = next else {
            return Ok(());
        };

        self.state
            .create_message(&message.environment_key, &message.path, message.data)
            .await?;
        self.last_synced_message_ts
            .store(message.ts, Ordering::Release);
        Ok(())
    }

    fn should_live_sync(&self) -> bool {
        if self.state.config.force_offline_sync {
            return false;
        }
        is_live(self.state.activity.last_received_ms(), unix_millis_now())
    }

    fn note_live_mode(&self, live: bool) {
        let was = self.was_live.swap(live, Ordering::AcqRel);
        if live && !was {
            tracing::info!("switched to live sync for records");
        } else if !live && was {
            tracing::info!("switched to offline sync for records");
        }
    }

    fn note_records_up_to_date(&self, up_to_date: bool) {
        let was = self.records_up_to_date.swap(up_to_date, Ordering::AcqRel);
        if up_to_date && !was {
            tracing::info!("records are up to date");
        } else if !up_to_date && was {
            tracing::info!("records are out of date");
        }
    }

    fn note_messages_up_to_date(&self, up_to_date: bool) {
        let was = self.messages_up_to_date.swap(up_to_date, Ordering::AcqRel);
        if up_to_date && !was {
            tracing::info!("messages are up to date");
        } else if !up_to_date && was {
            tracing::info!("messages are out of date");
        }
    }

    /// Current message tail cursor (unix microseconds), for observability.
    pub fn message_cursor(&self) -> i64 {
        self.last_synced_message_ts.load(Ordering::Acquire)
    }
}
