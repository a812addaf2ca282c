// src/api/types.rs

use serde::{Deserialize, Serialize};

use crate::memory::ChatTurn;

pub use crate::core::relay::RelayRequest as ChatRequest;

/// Query for `GET /api/chat/history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub openid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub records: Vec<ChatTurn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub live_sessions: usize,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
