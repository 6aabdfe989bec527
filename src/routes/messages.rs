//! Message endpoints: ingestion and cursor-based reads
//!
//! Callers address messages by a path *without* the node-instance prefix;
//! the server prepends the producing instance on write and re-applies it on
//! read. A path ending in `/` is matched by prefix, otherwise exactly.
//! "No message" is the JSON string `"NONE"`, distinguishable from every
//! real payload shape.

use crate::addressing::{compose_path, strip_instance, PATH_SEPARATOR};
use crate::error::Result;
use crate::query::parse_micros_param;
use crate::state::AppState;
use crate::store::PathMatch;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageBody {
    environment_key: String,
    /// Path without the node instance prefix.
    path: String,
    data: JsonValue,
}

/// POST /messages
///
/// Upload a single message from a given environment and path. The timestamp
/// is always assigned by this node's clock.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateMessageBody>,
) -> Result<StatusCode> {
    state
        .create_message(&body.environment_key, &body.path, body.data)
        .await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextMessageQuery {
    environment_key: String,
    /// Path without the node instance prefix; trailing `/` = prefix match.
    path: String,
    /// Session token override; defaults to the current node instance.
    session: Option<String>,
    /// Unix microseconds, exclusive. E.g. the exact `ts` of the last
    /// message received.
    after_ts: Option<String>,
}

/// GET /messages/next
///
/// The next message on a path after a given `ts`, or `"NONE"`.
pub async fn next(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NextMessageQuery>,
) -> Result<Json<JsonValue>> {
    let after_ts = parse_micros_param("afterTs", query.after_ts.as_deref())?;

    let instance = match query.session.as_deref() {
        Some(token) => state.identity.instance_for_token(token),
        None => state.identity.instance(),
    };
    let full_path = compose_path(&instance, &query.path);
    let path_match = if full_path.ends_with(PATH_SEPARATOR) {
        PathMatch::Prefix(full_path)
    } else {
        PathMatch::Exact(full_path)
    };

    let message = state
        .store
        .next_message(query.environment_key, path_match, after_ts)
        .await?;

    Ok(Json(match message {
        Some(m) => json!({ "ts": m.ts, "data": m.data }),
        None => json!("NONE"),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextGlobalQuery {
    /// Unix microseconds, exclusive.
    after_ts: Option<String>,
}

/// GET /messages/nextGlobal
///
/// The next message across all environments, sessions, and paths after a
/// given `ts`, or `"NONE"`. The returned path has the producing node
/// instance stripped; parent-side children re-derive their own addressing
/// when they pull from this endpoint.
pub async fn next_global(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NextGlobalQuery>,
) -> Result<Json<JsonValue>> {
    let after_ts = parse_micros_param("afterTs", query.after_ts.as_deref())?;

    let message = state.store.next_message_global(after_ts).await?;

    Ok(Json(match message {
        Some(m) => json!({
            "environmentKey": m.environment_key,
            "path": strip_instance(&m.path),
            "ts": m.ts,
            "data": m.data,
        }),
        None => json!("NONE"),
    }))
}
