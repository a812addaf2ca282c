// src/api/mod.rs — HTTP surface: streaming chat, history and health

pub mod chat;
pub mod handlers;
pub mod types;

use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::core::relay::ChatRelay;
use crate::infra::config::ServerConfig;
use crate::infra::errors::JieyouError;
use types::ErrorResponse;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub relay: Arc<ChatRelay>,
}

impl ApiState {
    pub fn new(relay: Arc<ChatRelay>) -> Self {
        Self { relay }
    }
}

/// Map an error to its HTTP status and JSON body.
pub fn error_reply(err: &JieyouError) -> (StatusCode, Json<ErrorResponse>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Empty list allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    let origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/api/health", get(handlers::health))
        .route("/api/chat", post(chat::chat_sse))
        .route("/api/chat/ws", get(chat::chat_ws))
        .route("/api/chat/history", get(handlers::history))
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn start_server(config: &ServerConfig, state: ApiState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let router = build_router(state, config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Could not install ctrl-c handler: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reply_status() {
        let (status, body) = error_reply(&JieyouError::LimitExceeded { limit: 10 });
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body.0.error.contains("10"));

        let (status, _) = error_reply(&JieyouError::store("locked"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
