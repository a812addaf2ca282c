// src/core/worker.rs — Drives one upstream generation for a session
//
// Order of effects: user turn persisted -> deltas appended -> assistant turn
// persisted (whatever was produced, even after an upstream error) ->
// buffer completed -> session released. Completion always precedes release.

use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::registry::{Session, SessionRegistry};
use crate::infra::config::Config;
use crate::memory::{ChatStore, ChatTurn};
use crate::provider::{ChatRequest, Message, ModelProvider, Role};

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub system_prompt: String,
    pub history_window: u32,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.provider.model.clone(),
            system_prompt: config.chat.system_prompt.clone(),
            history_window: config.chat.history_window,
            max_tokens: Some(config.provider.max_tokens).filter(|t| *t > 0),
            temperature: config.provider.temperature,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// A previous attempt had already persisted the reply; it was replayed
    /// into the buffer and no upstream call was made.
    Reused { chars: usize },
    Finished {
        chars: usize,
        persisted: bool,
        error: Option<String>,
    },
}

impl GenerationOutcome {
    pub fn error(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Finished { error, .. } => error.as_deref(),
            GenerationOutcome::Reused { .. } => None,
        }
    }
}

/// Completes and evicts the session even if generation panics.
struct SessionGuard<'a> {
    session: &'a Session,
    registry: &'a SessionRegistry,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.session
            .buffer
            .complete(Some("generation aborted".into()));
        self.registry.release(&self.session.key);
    }
}

pub struct GenerationWorker {
    store: Arc<dyn ChatStore>,
    provider: Arc<dyn ModelProvider>,
    registry: Arc<SessionRegistry>,
    settings: GenerationSettings,
}

impl GenerationWorker {
    pub fn new(
        store: Arc<dyn ChatStore>,
        provider: Arc<dyn ModelProvider>,
        registry: Arc<SessionRegistry>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            store,
            provider,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Run the generation on its own task. Dropping the handle does not stop it.
    pub fn spawn(
        self: &Arc<Self>,
        session: Arc<Session>,
        content: String,
    ) -> JoinHandle<GenerationOutcome> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.run(session, content).await })
    }

    pub async fn run(&self, session: Arc<Session>, content: String) -> GenerationOutcome {
        let _guard = SessionGuard {
            session: &session,
            registry: &self.registry,
        };

        let outcome = self.generate(&session, &content).await;
        session
            .buffer
            .complete(outcome.error().map(str::to_string));

        match &outcome {
            GenerationOutcome::Reused { chars } => {
                tracing::info!(session = %session.key, chars, "Replayed persisted reply");
            }
            GenerationOutcome::Finished {
                chars,
                persisted,
                error: None,
            } => {
                tracing::info!(session = %session.key, chars, persisted, "Generation finished");
            }
            GenerationOutcome::Finished {
                chars,
                persisted,
                error: Some(err),
            } => {
                tracing::warn!(
                    session = %session.key,
                    chars,
                    persisted,
                    "Generation ended early: {}",
                    err
                );
            }
        }
        outcome
    }

    async fn generate(&self, session: &Session, content: &str) -> GenerationOutcome {
        let key = &session.key;

        // A previous worker may have finished between the relay's store
        // check and its acquire.
        match self.store.find_completed_turn(key.user_id, &key.msg_id).await {
            Ok(Some(turn)) => {
                let chars = session.buffer.append(&turn.content);
                return GenerationOutcome::Reused { chars };
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(session = %key, "Completed-turn lookup failed: {}", e),
        }

        let history = match self
            .store
            .load_recent_turns(key.user_id, self.settings.history_window)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(session = %key, "Could not load history: {}", e);
                Vec::new()
            }
        };

        if let Err(e) = self
            .store
            .append_turn(key.user_id, &key.msg_id, Role::User, content)
            .await
        {
            tracing::error!(session = %key, "Failed to persist user turn: {}", e);
        }

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: self.build_context(&history, &key.msg_id, content),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let mut error = None;
        match self.provider.chat_stream(request).await {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(chunk) => {
                            let delta = chunk.delta.replace('\0', "");
                            if !delta.is_empty() {
                                session.buffer.append(&delta);
                            }
                            if let Some(usage) = chunk.usage {
                                tracing::debug!(
                                    session = %key,
                                    tokens = usage.total(),
                                    "Upstream usage"
                                );
                            }
                        }
                        Err(e) => {
                            error = Some(e.to_string());
                            break;
                        }
                    }
                }
            }
            Err(e) => error = Some(e.to_string()),
        }

        let text = session.buffer.text();
        let chars = session.buffer.len();
        let persisted = if text.is_empty() {
            false
        } else {
            match self
                .store
                .append_turn(key.user_id, &key.msg_id, Role::Assistant, &text)
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    // Attached relays still get the buffer; a reconnect after
                    // eviction will find nothing and may regenerate.
                    tracing::error!(session = %key, "Failed to persist reply: {}", e);
                    false
                }
            }
        };

        GenerationOutcome::Finished {
            chars,
            persisted,
            error,
        }
    }

    /// System directive, then the window oldest first, then the new turn.
    /// Turns from an earlier attempt at the same message are skipped.
    pub fn build_context(
        &self,
        history: &[ChatTurn],
        msg_id: &str,
        content: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.settings.system_prompt.clone()));
        for turn in history.iter().filter(|t| t.msg_id != msg_id) {
            messages.push(match turn.role {
                Role::Assistant => Message::assistant(turn.content.clone()),
                _ => Message::user(turn.content.clone()),
            });
        }
        messages.push(Message::user(content));
        messages
    }
}
