//! Time-window resolution for range queries
//!
//! Query handlers combine three things into one inclusive `[start, end]`
//! window: caller-supplied bounds (where a negative value means "that many
//! microseconds before now"), and the time range of the targeted session.
//! The tightest intersection wins: a record must satisfy both.

use crate::error::NodeError;
use crate::store::Store;

/// An inclusive time window; `None` on either side means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeWindow {
    /// Intersect two windows, keeping the tighter bound on each side.
    pub fn intersect(self, other: TimeWindow) -> TimeWindow {
        TimeWindow {
            start: max_bound(self.start, other.start),
            end: min_bound(self.end, other.end),
        }
    }
}

fn max_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (bound, None) | (None, bound) => bound,
    }
}

fn min_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (bound, None) | (None, bound) => bound,
    }
}

/// Resolve a caller-supplied bound against the current time: negative
/// values are relative offsets into the past.
pub fn resolve_bound(value: i64, now_micros: i64) -> i64 {
    if value < 0 {
        now_micros + value
    } else {
        value
    }
}

/// Parse an optional numeric query parameter, surfacing a descriptive
/// validation error for non-numeric input.
pub fn parse_micros_param(name: &str, value: Option<&str>) -> Result<Option<i64>, NodeError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| NodeError::validation(format!("{name} must be a number"))),
    }
}

/// Parse an optional non-negative count parameter (e.g. `take`).
pub fn parse_count_param(name: &str, value: Option<&str>) -> Result<Option<i64>, NodeError> {
    match parse_micros_param(name, value)? {
        Some(count) if count < 0 => Err(NodeError::validation(format!(
            "{name} must not be negative"
        ))),
        other => Ok(other),
    }
}

/// Resolve the time range of a session within an environment.
///
/// With a name: `[created_at, next.created_at - 1]`, unbounded above for the
/// newest session; unknown names are an error. Without a name: the current
/// session's range, or a fully unbounded window when the environment has no
/// sessions at all (callers treat that as "no session scoping").
pub async fn session_time_range(
    store: &Store,
    environment_key: &str,
    session_name: Option<&str>,
) -> Result<TimeWindow, NodeError> {
    let session = match session_name {
        None => {
            return Ok(TimeWindow {
                start: store
                    .current_session(environment_key.to_string())
                    .await?
                    .map(|s| s.created_at),
                end: None,
            });
        }
        Some(name) => store
            .session_by_name(environment_key.to_string(), name.to_string())
            .await?
            .ok_or(NodeError::SessionNotFound)?,
    };

    let end = store
        .next_session_created_at(environment_key.to_string(), session.created_at)
        .await?
        .map(|next_created_at| next_created_at - 1);

    Ok(TimeWindow {
        start: Some(session.created_at),
        end,
    })
}
