// src/api/handlers.rs

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::{error_reply, types::*, ApiState};
use crate::infra::errors::JieyouError;

/// GET /ping
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        message: "pong".into(),
    })
}

/// GET /api/health
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        live_sessions: state.relay.registry().live_count(),
    })
}

/// GET /api/chat/history?openid= — every persisted turn of the user, oldest first.
pub async fn history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, Json<ErrorResponse>)> {
    let openid = query
        .openid
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| error_reply(&JieyouError::InvalidRequest("openid required".into())))?;

    let store = state.relay.store();
    let user = store
        .find_user(openid)
        .await
        .map_err(|e| error_reply(&e))?
        .ok_or_else(|| error_reply(&JieyouError::NotFound("user".into())))?;

    let records = store
        .list_turns(user.id)
        .await
        .map_err(|e| error_reply(&e))?;
    Ok(Json(HistoryResponse { records }))
}
