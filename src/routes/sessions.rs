//! Session management routes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::json;

use super::client_ip::ClientIp;
use crate::services::session::{self, SessionError, SessionMessage, SessionRecord};
use crate::state::AppState;

#[derive(Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: i64,
    pub last_activity: i64,
    pub message_count: usize,
}

#[derive(Serialize)]
pub struct SessionDetail {
    pub session_id: String,
    pub created_at: i64,
    pub last_activity: i64,
    pub message_count: usize,
    pub messages: Vec<SessionMessage>,
}

fn to_summary(record: &SessionRecord) -> SessionSummary {
    SessionSummary {
        session_id: record.session_id.clone(),
        created_at: record.created_at,
        last_activity: record.last_activity,
        message_count: record.messages.len(),
    }
}

pub(crate) fn session_error_to_status(err: SessionError) -> StatusCode {
    match err {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SessionError::Store(_) => StatusCode::BAD_GATEWAY,
    }
}

/// `POST /session` — create a session owned by the caller's IP.
pub async fn create_session(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let record = session::create_session(state.store.as_ref(), &ip, state.config.session)
        .await
        .map_err(session_error_to_status)?;

    Ok(Json(json!({
        "session_id": record.session_id,
        "ttl": state.config.session.ttl_secs,
    })))
}

/// `GET /session/{id}` — fetch a session with full history.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetail>, StatusCode> {
    let record = session::fetch_session(state.store.as_ref(), &session_id)
        .await
        .map_err(session_error_to_status)?;

    Ok(Json(SessionDetail {
        session_id: record.session_id,
        created_at: record.created_at,
        last_activity: record.last_activity,
        message_count: record.messages.len(),
        messages: record.messages,
    }))
}

/// `DELETE /session/{id}` — delete a session.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let deleted = session::delete_session(state.store.as_ref(), &session_id)
        .await
        .map_err(session_error_to_status)?;

    if !deleted {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({ "deleted": true, "session_id": session_id })))
}

/// `GET /sessions` — list the caller's sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let records = session::list_sessions(state.store.as_ref(), &ip)
        .await
        .map_err(session_error_to_status)?;

    let summaries: Vec<SessionSummary> = records.iter().map(to_summary).collect();
    Ok(Json(json!({
        "total_sessions": summaries.len(),
        "sessions": summaries,
    })))
}

#[cfg(test)]
#[path = "sessions_test.rs"]
mod tests;
