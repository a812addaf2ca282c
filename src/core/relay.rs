// src/core/relay.rs — Serves one client connection against a live or finished generation
//
// `open` runs every client-facing check before a single frame is sent;
// `drive` then replays from the client's offset and follows the buffer until
// completion or until the transport fails.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::policy::ChatPolicy;
use super::registry::{Session, SessionKey, SessionRegistry};
use super::transport::{Frame, Transport};
use super::worker::GenerationWorker;
use crate::infra::errors::JieyouError;
use crate::memory::{ChatStore, UserRow};

/// Longest msg_id accepted from clients.
pub const MAX_MSG_ID_LEN: usize = 64;

/// What a client sends to start or resume a reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayRequest {
    #[serde(default)]
    pub openid: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub msg_id: String,
    /// Chars already delivered to this client on an earlier connection.
    #[serde(default)]
    pub received_offset: usize,
}

impl RelayRequest {
    pub fn validate(&self) -> Result<(), JieyouError> {
        if self.openid.trim().is_empty() {
            return Err(JieyouError::InvalidRequest("openid required".into()));
        }
        let msg_id = self.msg_id.trim();
        if msg_id.is_empty() {
            return Err(JieyouError::InvalidRequest("msg_id required".into()));
        }
        if msg_id.len() > MAX_MSG_ID_LEN {
            return Err(JieyouError::InvalidRequest(format!(
                "msg_id longer than {MAX_MSG_ID_LEN} bytes"
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Source {
    /// Reply already persisted; `suffix` is what the client has not seen.
    Stored { suffix: String },
    Live { session: Arc<Session>, offset: usize },
}

/// A request that passed `open` and is ready to stream.
#[derive(Debug)]
pub struct OpenedRelay {
    pub key: SessionKey,
    pub user: UserRow,
    /// True when this request created the session and spawned the worker.
    pub started_generation: bool,
    source: Source,
}

impl OpenedRelay {
    pub fn is_from_store(&self) -> bool {
        matches!(self.source, Source::Stored { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// End-of-stream was sent. `delivered` counts chars sent on this connection.
    Completed { delivered: usize, from_store: bool },
    /// The transport failed; the worker keeps running.
    Disconnected { delivered: usize },
}

pub struct ChatRelay {
    store: Arc<dyn ChatStore>,
    registry: Arc<SessionRegistry>,
    worker: Arc<GenerationWorker>,
    policy: ChatPolicy,
    poll_interval: Duration,
}

impl ChatRelay {
    pub fn new(
        store: Arc<dyn ChatStore>,
        worker: Arc<GenerationWorker>,
        policy: ChatPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            registry: worker.registry().clone(),
            worker,
            policy,
            poll_interval,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    /// Read the request from the transport, open it and stream the reply.
    pub async fn serve<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
    ) -> Result<RelayOutcome, JieyouError> {
        let raw = transport.receive().await?;
        let request: RelayRequest = serde_json::from_slice(&raw)
            .map_err(|e| JieyouError::InvalidRequest(format!("malformed request: {e}")))?;
        let opened = self.open(&request).await?;
        Ok(self.drive(opened, transport).await)
    }

    pub async fn open(&self, request: &RelayRequest) -> Result<OpenedRelay, JieyouError> {
        request.validate()?;

        let user = self
            .store
            .get_or_create_user(request.openid.trim(), request.nickname.trim())
            .await?;
        let key = SessionKey::new(user.id, request.msg_id.trim());
        let offset = request.received_offset;

        // Finished replies are served from storage; the session is gone by now.
        if let Some(turn) = self
            .store
            .find_completed_turn(key.user_id, &key.msg_id)
            .await?
        {
            let total = turn.content.chars().count();
            if offset > total {
                tracing::warn!(session = %key, offset, total, "Resume offset past end, clamping");
            }
            let suffix = turn.content.chars().skip(offset).collect();
            return Ok(OpenedRelay {
                key,
                user,
                started_generation: false,
                source: Source::Stored { suffix },
            });
        }

        let admitted = if self.registry.get(&key).is_none() {
            self.policy
                .admit(self.store.as_ref(), user.id, &request.content)
                .await?;
            true
        } else {
            false
        };

        let (session, is_owner) = self.registry.acquire(&key);
        if is_owner {
            // The session we saw may have been released in between.
            if !admitted {
                if let Err(e) = self
                    .policy
                    .admit(self.store.as_ref(), user.id, &request.content)
                    .await
                {
                    session.buffer.complete(Some(e.to_string()));
                    self.registry.release(&key);
                    return Err(e);
                }
            }
            tracing::info!(session = %key, "Starting generation");
            self.worker.spawn(session.clone(), request.content.clone());
        } else {
            tracing::debug!(session = %key, offset, "Attaching to live session");
        }

        let current = session.buffer.len();
        if offset > current {
            tracing::warn!(session = %key, offset, current, "Resume offset past end, clamping");
        }

        Ok(OpenedRelay {
            key,
            user,
            started_generation: is_owner,
            source: Source::Live {
                session,
                offset: offset.min(current),
            },
        })
    }

    pub async fn drive<T: Transport + ?Sized>(
        &self,
        opened: OpenedRelay,
        transport: &mut T,
    ) -> RelayOutcome {
        let key = opened.key;
        match opened.source {
            Source::Stored { suffix } => {
                let delivered = suffix.chars().count();
                if !suffix.is_empty() && transport.send_frame(&Frame::Delta(suffix)).await.is_err()
                {
                    tracing::debug!(session = %key, "Client gone before stored reply was sent");
                    return RelayOutcome::Disconnected { delivered: 0 };
                }
                if transport.send_frame(&Frame::End).await.is_err() {
                    return RelayOutcome::Disconnected { delivered };
                }
                RelayOutcome::Completed {
                    delivered,
                    from_store: true,
                }
            }
            Source::Live { session, offset } => {
                self.follow(&key, &session, offset, transport).await
            }
        }
    }

    async fn follow<T: Transport + ?Sized>(
        &self,
        key: &SessionKey,
        session: &Session,
        offset: usize,
        transport: &mut T,
    ) -> RelayOutcome {
        let mut sent = offset;
        let mut delivered = 0;

        loop {
            let snapshot = session.buffer.read_from(sent);
            for fragment in snapshot.fragments {
                let chars = fragment.chars().count();
                if let Err(e) = transport.send_frame(&Frame::Delta(fragment)).await {
                    tracing::debug!(session = %key, delivered, "Relay abandoned: {}", e);
                    return RelayOutcome::Disconnected { delivered };
                }
                delivered += chars;
            }
            sent = snapshot.end;

            if snapshot.completed {
                if transport.send_frame(&Frame::End).await.is_err() {
                    return RelayOutcome::Disconnected { delivered };
                }
                return RelayOutcome::Completed {
                    delivered,
                    from_store: false,
                };
            }

            session
                .buffer
                .wait_for_change(sent, self.poll_interval)
                .await;
        }
    }
}
