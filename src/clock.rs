//! Node clock source
//!
//! Timestamps everywhere in this system are unix microseconds. The clock
//! hands out strictly increasing values even when the wall clock stalls
//! within a microsecond or steps backwards slightly, so server-assigned
//! message timestamps are unique and session `created_at` values are
//! totally ordered.

use std::process::Command;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Strictly increasing unix-microsecond clock.
#[derive(Debug)]
pub struct Clock {
    last: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Current wall time in unix microseconds, clamped to be strictly
    /// greater than any value previously returned by this instance.
    pub fn now_micros(&self) -> i64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_micros() as i64;

        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall time in unix milliseconds (no monotonic clamping).
///
/// Used for the sync worker's live/offline activity window, where
/// sub-millisecond ordering does not matter.
pub fn unix_millis_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

#[derive(Error, Debug)]
pub enum ClockSyncError {
    #[error("system clock is not synchronized; run `timedatectl status` to see why")]
    NotSynchronized,
}

/// Check whether the OS reports the system clock as NTP-synchronized.
///
/// Only meaningful on Linux; other platforms pass trivially. A machine that
/// boots without NTP sync can stamp telemetry hours off until the clock
/// jumps, which poisons the per-device `(environment, device, ts)` keyspace.
/// The caller decides whether a failed check aborts startup.
pub fn clock_sync_check() -> Result<(), ClockSyncError> {
    if !cfg!(target_os = "linux") {
        return Ok(());
    }

    match Command::new("timedatectl").arg("status").output() {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if clock_synchronized(&stdout) {
                Ok(())
            } else {
                Err(ClockSyncError::NotSynchronized)
            }
        }
        Err(_) => {
            tracing::warn!(
                "unable to check clock synchronization: timedatectl command not found"
            );
            Ok(())
        }
    }
}

/// Parse `timedatectl status` output for the synchronization line.
pub fn clock_synchronized(output: &str) -> bool {
    output.contains("System clock synchronized: yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_micros_strictly_increases() {
        let clock = Clock::new();
        let mut prev = clock.now_micros();
        for _ in 0..1000 {
            let next = clock.now_micros();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn now_micros_is_wall_clock_scale() {
        let clock = Clock::new();
        let micros = clock.now_micros();
        // Sometime after 2020-01-01 and before 2100.
        assert!(micros > 1_577_836_800_000_000);
        assert!(micros < 4_102_444_800_000_000);
    }

    #[test]
    fn parses_timedatectl_output() {
        let synced = "\
               Local time: Thu 2026-08-06 12:00:00 UTC\n\
           Universal time: Thu 2026-08-06 12:00:00 UTC\n\
                 RTC time: Thu 2026-08-06 12:00:00\n\
                Time zone: Etc/UTC (UTC, +0000)\n\
System clock synchronized: yes\n\
              NTP service: active\n";
        assert!(clock_synchronized(synced));

        let unsynced = synced.replace("synchronized: yes", "synchronized: no");
        assert!(!clock_synchronized(&unsynced));
        assert!(!clock_synchronized(""));
    }
}
