//! Session directory endpoints

use crate::error::{NodeError, Result};
use crate::query::parse_micros_param;
use crate::state::AppState;
use crate::store::{generate_session_name, SessionRow};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    environment_key: String,
    /// Defaults to an autogenerated name based on the current timestamp.
    name: Option<String>,
}

/// POST /sessions/create
///
/// Start a new session for a given environment. Only session-maker nodes
/// may mint sessions explicitly.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<SessionRow>> {
    if !state.config.session_maker {
        return Err(NodeError::NotSessionMaker);
    }

    let created_at = state.clock.now_micros();
    let name = body.name.unwrap_or_else(|| generate_session_name(created_at));

    state
        .store
        .create_session(body.environment_key, name.clone(), created_at)
        .await?;

    Ok(Json(SessionRow { name, created_at }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    environment_key: String,
    /// Unix microseconds, inclusive.
    created_after: Option<String>,
    /// Unix microseconds, inclusive.
    created_before: Option<String>,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    /// In ascending order of creation time.
    pub sessions: Vec<SessionRow>,
}

/// GET /sessions
///
/// List sessions for a given environment.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<SessionsResponse>> {
    let created_after = parse_micros_param("createdAfter", query.created_after.as_deref())?;
    let created_before = parse_micros_param("createdBefore", query.created_before.as_deref())?;

    let sessions = state
        .store
        .list_sessions(query.environment_key, created_after, created_before)
        .await?;

    Ok(Json(SessionsResponse { sessions }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSessionQuery {
    environment_key: String,
}

/// GET /sessions/current
///
/// The current session for a given environment, or `"NONE"`.
pub async fn current(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CurrentSessionQuery>,
) -> Result<Json<JsonValue>> {
    let session = state.store.current_session(query.environment_key).await?;

    Ok(Json(match session {
        Some(session) => json!(session),
        None => json!("NONE"),
    }))
}
