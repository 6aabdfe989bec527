//! Upstream replication: parent client and background sync worker

mod parent;
mod worker;

pub use parent::{GlobalRecord, ParentClient, ParentError, ParentMessage};
pub use worker::{SyncError, SyncWorker};

use crate::clock::unix_millis_now;
use std::sync::atomic::{AtomicI64, Ordering};

/// Side channel from the ingestion handlers to the sync worker's
/// live/offline decision.
///
/// Handlers call [`mark`](Self::mark) on every accepted record write; the
/// worker reads the timestamp each iteration. A plain atomic write is
/// enough — staleness by one loop iteration is harmless — and marking never
/// blocks or fails the ingestion request, whether or not a worker is
/// running.
#[derive(Debug)]
pub struct RecordActivity {
    /// Unix milliseconds of the most recent accepted record write;
    /// 0 = no record received yet this process.
    last_received_ms: AtomicI64,
}

impl RecordActivity {
    pub fn new() -> Self {
        Self {
            last_received_ms: AtomicI64::new(0),
        }
    }

    /// Note that a record was just received.
    pub fn mark(&self) {
        self.last_received_ms
            .store(unix_millis_now(), Ordering::Release);
    }

    /// When the last record was received, if ever.
    pub fn last_received_ms(&self) -> Option<i64> {
        match self.last_received_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(ms),
        }
    }
}

impl Default for RecordActivity {
    fn default() -> Self {
        Self::new()
    }
}
