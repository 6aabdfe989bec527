//! CSV export convenience endpoint

use crate::error::{NodeError, Result};
use crate::query::{parse_micros_param, session_time_range, TimeWindow};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    /// Unix microseconds, inclusive.
    start_ts: Option<String>,
    /// Unix microseconds, inclusive.
    end_ts: Option<String>,
}

/// GET /export/:environmentKey/:sessionName/:device/records
///
/// All records from a given environment, session, and device as CSV,
/// ascending by timestamp. Use `latest` as the session name for the
/// current session.
pub async fn records_csv(
    State(state): State<Arc<AppState>>,
    Path((environment_key, session_name, device)): Path<(String, String, String)>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let start_ts = parse_micros_param("startTs", query.start_ts.as_deref())?;
    let end_ts = parse_micros_param("endTs", query.end_ts.as_deref())?;

    let session_name = if session_name == "latest" {
        None
    } else {
        Some(session_name)
    };
    let session = session_time_range(&state.store, &environment_key, session_name.as_deref())
        .await?;
    let caller = TimeWindow {
        start: start_ts,
        end: end_ts,
    };

    let records = state
        .store
        .list_records(environment_key, device, caller.intersect(session), true, None)
        .await?;

    let mut csv = String::from("ts,data\n");
    for record in records {
        let data = serde_json::to_string(&record.data)
            .map_err(|e| NodeError::internal(e.to_string()))?;
        csv.push_str(&format!(
            "{},\"{}\"\n",
            record.ts,
            data.replace('"', "\"\"")
        ));
    }

    Ok(([(header::CONTENT_TYPE, "text/csv")], csv).into_response())
}
