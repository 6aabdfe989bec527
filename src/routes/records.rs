//! Record endpoints: ingestion (single, batch, global batch) and queries
//! (range listing, multi-device latest poll)

use crate::error::Result;
use crate::query::{
    parse_count_param, parse_micros_param, resolve_bound, session_time_range, TimeWindow,
};
use crate::state::AppState;
use crate::store::{NewRecord, RecordRow};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use futures::future;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordBody {
    environment_key: String,
    device: String,
    /// Unix microseconds. Defaults to the current time of this node.
    ts: Option<i64>,
    data: JsonValue,
}

/// POST /records
///
/// Upload a single record from a given environment and device.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRecordBody>,
) -> Result<StatusCode> {
    let ts = body.ts.unwrap_or_else(|| state.clock.now_micros());
    state
        .store
        .insert_records(vec![NewRecord {
            environment_key: body.environment_key,
            device: body.device,
            ts,
            data: body.data,
        }])
        .await?;

    state.activity.mark();
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub struct BatchRecordItem {
    ts: i64,
    data: JsonValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchBody {
    environment_key: String,
    device: String,
    records: Vec<BatchRecordItem>,
}

/// POST /records/batch
///
/// Upload multiple records from the same environment and device. Elements
/// whose `(environment, device, ts)` key already exists are silently
/// skipped; the rest are kept.
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBatchBody>,
) -> Result<StatusCode> {
    let rows = body
        .records
        .into_iter()
        .map(|r| NewRecord {
            environment_key: body.environment_key.clone(),
            device: body.device.clone(),
            ts: r.ts,
            data: r.data,
        })
        .collect();
    state.store.insert_records(rows).await?;

    state.activity.mark();
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRecordItem {
    environment_key: String,
    device: String,
    ts: i64,
    data: JsonValue,
}

#[derive(Deserialize)]
pub struct CreateBatchGlobalBody {
    records: Vec<GlobalRecordItem>,
}

/// POST /records/batchGlobal
///
/// Upload records across multiple environments and devices at once. This is
/// the endpoint child nodes replicate into.
pub async fn create_batch_global(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBatchGlobalBody>,
) -> Result<StatusCode> {
    let rows = body
        .records
        .into_iter()
        .map(|r| NewRecord {
            environment_key: r.environment_key,
            device: r.device,
            ts: r.ts,
            data: r.data,
        })
        .collect();
    state.store.insert_records(rows).await?;

    state.activity.mark();
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsQuery {
    environment_key: String,
    device: String,
    /// Defaults to the current session.
    session_name: Option<String>,
    /// Unix microseconds, inclusive. Negative = relative to now.
    start_ts: Option<String>,
    /// Unix microseconds, inclusive. Negative = relative to now.
    end_ts: Option<String>,
    /// Maximum number of records to return.
    take: Option<String>,
}

#[derive(Serialize)]
pub struct RecordsResponse {
    pub records: Vec<RecordRow>,
}

/// GET /records
///
/// List records from a given environment and device, scoped to a session's
/// time range intersected with the caller's bounds. With `startTs` the
/// earliest records come first (paging forward from a known point);
/// without it the latest come first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<RecordsResponse>> {
    let start_ts = parse_micros_param("startTs", query.start_ts.as_deref())?;
    let end_ts = parse_micros_param("endTs", query.end_ts.as_deref())?;
    let take = parse_count_param("take", query.take.as_deref())?;

    let now = state.clock.now_micros();
    let caller = TimeWindow {
        start: start_ts.map(|v| resolve_bound(v, now)),
        end: end_ts.map(|v| resolve_bound(v, now)),
    };
    let session = session_time_range(
        &state.store,
        &query.environment_key,
        query.session_name.as_deref(),
    )
    .await?;

    let records = state
        .store
        .list_records(
            query.environment_key,
            query.device,
            caller.intersect(session),
            start_ts.is_some(),
            take,
        )
        .await?;

    Ok(Json(RecordsResponse { records }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiDeviceQuery {
    environment_key: String,
    /// A comma-separated list of devices to poll.
    devices: String,
    /// Defaults to the current session.
    session_name: Option<String>,
    /// Unix microseconds, inclusive. Negative = relative to now.
    end_ts: Option<String>,
}

/// GET /records/multiDevice
///
/// The latest record from each of the given devices, as of the optional
/// time bound. Devices with no matching record map to `null`. This is a
/// pure read: it never creates sessions or records.
pub async fn multi_device(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MultiDeviceQuery>,
) -> Result<Json<BTreeMap<String, Option<RecordRow>>>> {
    let end_ts = parse_micros_param("endTs", query.end_ts.as_deref())?;

    let now = state.clock.now_micros();
    let caller = TimeWindow {
        start: None,
        end: end_ts.map(|v| resolve_bound(v, now)),
    };
    let session = session_time_range(
        &state.store,
        &query.environment_key,
        query.session_name.as_deref(),
    )
    .await?;
    let window = caller.intersect(session);

    let devices: Vec<String> = query.devices.split(',').map(str::to_string).collect();
    let lookups = devices.iter().map(|device| {
        state
            .store
            .latest_record(query.environment_key.clone(), device.clone(), window)
    });
    let results = future::join_all(lookups).await;

    let mut records = BTreeMap::new();
    for (device, result) in devices.into_iter().zip(results) {
        records.insert(device, result?);
    }
    Ok(Json(records))
}
