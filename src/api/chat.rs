// src/api/chat.rs — Streaming chat endpoints (SSE and WebSocket)

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use std::time::Duration;

use crate::api::{error_reply, ApiState};
use crate::core::relay::RelayRequest;
use crate::core::transport::{ChannelTransport, Frame, Transport};
use crate::infra::errors::JieyouError;

/// Frames buffered between the relay task and the SSE body.
const FRAME_CHANNEL_CAPACITY: usize = 64;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// POST /api/chat — open the relay, then stream frames as SSE.
///
/// Everything that can be rejected is rejected before the response switches
/// to `text/event-stream`, so clients get a plain JSON error with a status.
pub async fn chat_sse(State(state): State<ApiState>, body: Bytes) -> Response {
    let request: RelayRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            let err = JieyouError::InvalidRequest(format!("malformed request: {e}"));
            return error_reply(&err).into_response();
        }
    };

    let opened = match state.relay.open(&request).await {
        Ok(opened) => opened,
        Err(e) => {
            log_rejection(&e);
            return error_reply(&e).into_response();
        }
    };

    tracing::debug!(
        session = %opened.key,
        started = opened.started_generation,
        from_store = opened.is_from_store(),
        offset = request.received_offset,
        "Streaming over SSE"
    );

    let (mut transport, mut rx) = ChannelTransport::new(Vec::new(), FRAME_CHANNEL_CAPACITY);
    let relay = state.relay.clone();
    tokio::spawn(async move {
        let key = opened.key.clone();
        let outcome = relay.drive(opened, &mut transport).await;
        tracing::debug!(session = %key, ?outcome, "SSE relay finished");
    });

    let stream = async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            match frame {
                Frame::Delta(text) => {
                    yield Ok::<_, Infallible>(delta_event(&text));
                }
                Frame::End => {
                    yield Ok(Event::default().event("done").data("[DONE]"));
                    break;
                }
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response()
}

/// Deltas travel as `{"delta": "..."}` so line breaks and carriage returns
/// reach the client unchanged and its char count matches the server's.
fn delta_event(text: &str) -> Event {
    Event::default().data(serde_json::json!({ "delta": text }).to_string())
}

/// GET /api/chat/ws — the first text message is the request, every later
/// message is a frame; the last one is the end-of-stream sentinel.
pub async fn chat_ws(State(state): State<ApiState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let mut transport = WsTransport::new(socket);
        match state.relay.serve(&mut transport).await {
            Ok(outcome) => tracing::debug!(?outcome, "WebSocket relay finished"),
            Err(e) => {
                log_rejection(&e);
                transport.send_error(&e).await;
            }
        }
        transport.close().await;
    })
}

fn log_rejection(err: &JieyouError) {
    if err.is_client_error() {
        tracing::info!("Chat request rejected: {}", err);
    } else {
        tracing::error!("Chat request failed: {}", err);
    }
}

/// Transport over an upgraded axum WebSocket.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }

    async fn send_error(&mut self, err: &JieyouError) {
        let body = serde_json::json!({ "error": err.to_string(), "status": err.status_code() });
        if let Err(e) = self.send(body.to_string().as_bytes()).await {
            tracing::debug!("Could not deliver error to socket: {}", e);
        }
    }

    async fn close(&mut self) {
        let _ = self.socket.send(WsMessage::Close(None)).await;
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn receive(&mut self) -> Result<Vec<u8>, JieyouError> {
        while let Some(msg) = self.socket.recv().await {
            match msg.map_err(|e| JieyouError::Transport(e.to_string()))? {
                WsMessage::Text(text) => return Ok(text.as_str().as_bytes().to_vec()),
                WsMessage::Binary(bytes) => return Ok(bytes.to_vec()),
                WsMessage::Close(_) => break,
                // ping / pong
                _ => continue,
            }
        }
        Err(JieyouError::Transport(
            "socket closed before a request arrived".into(),
        ))
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), JieyouError> {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| JieyouError::Transport(format!("frame is not UTF-8: {e}")))?;
        self.socket
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| JieyouError::Transport(e.to_string()))
    }
}
