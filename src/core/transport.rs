// src/core/transport.rs — Per-connection duplex channel and stream framing

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::infra::errors::JieyouError;

/// Terminates every stream. Deltas never contain NUL (the worker strips it),
/// so no fragment can be mistaken for this marker.
pub const END_OF_STREAM: &str = "\u{0}[DONE]";

/// One unit sent to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Delta(String),
    End,
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Delta(text) => text.as_bytes().to_vec(),
            Frame::End => END_OF_STREAM.as_bytes().to_vec(),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, JieyouError> {
        if bytes == END_OF_STREAM.as_bytes() {
            return Ok(Frame::End);
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|e| JieyouError::Transport(format!("frame is not UTF-8: {e}")))?;
        Ok(Frame::Delta(text.to_string()))
    }
}

/// A connected client. `receive` is used once for the initial request,
/// `send` for every frame after that.
#[async_trait]
pub trait Transport: Send {
    async fn receive(&mut self) -> Result<Vec<u8>, JieyouError>;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), JieyouError>;

    async fn send_frame(&mut self, frame: &Frame) -> Result<(), JieyouError> {
        self.send(&frame.encode()).await
    }
}

/// Transport backed by an in-process channel. The request bytes are handed
/// over up front; frames go to whoever holds the receiver (the SSE response
/// body, or a test). Dropping the receiver looks like a client disconnect.
pub struct ChannelTransport {
    request: Option<Vec<u8>>,
    tx: mpsc::Sender<Frame>,
}

impl ChannelTransport {
    pub fn new(request: Vec<u8>, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                request: Some(request),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn receive(&mut self) -> Result<Vec<u8>, JieyouError> {
        self.request
            .take()
            .ok_or_else(|| JieyouError::Transport("request already consumed".into()))
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), JieyouError> {
        let frame = Frame::decode(bytes)?;
        self.tx
            .send(frame)
            .await
            .map_err(|_| JieyouError::Transport("client disconnected".into()))
    }
}
