// src/core/policy.rs — Admission checks before a new generation starts

use crate::infra::config::ChatConfig;
use crate::infra::errors::JieyouError;
use crate::memory::{store, ChatStore};

#[derive(Debug, Clone)]
pub struct ChatPolicy {
    pub max_message_chars: usize,
    pub max_chats_per_day: u32,
    /// Matched case-insensitively.
    pub blocked_terms: Vec<String>,
}

impl Default for ChatPolicy {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

impl ChatPolicy {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            max_message_chars: config.max_message_chars,
            max_chats_per_day: config.max_chats_per_day,
            blocked_terms: config
                .blocked_terms
                .iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Checks that need nothing but the message text.
    pub fn check_content(&self, content: &str) -> Result<(), JieyouError> {
        if content.trim().is_empty() {
            return Err(JieyouError::InvalidRequest("content required".into()));
        }
        if content.chars().count() > self.max_message_chars {
            return Err(JieyouError::InvalidRequest(format!(
                "message too long (max {} characters)",
                self.max_message_chars
            )));
        }
        let lowered = content.to_lowercase();
        if self.blocked_terms.iter().any(|t| lowered.contains(t.as_str())) {
            return Err(JieyouError::InvalidRequest(
                "message contains blocked content".into(),
            ));
        }
        Ok(())
    }

    /// Full admission: content checks plus the per-user daily cap.
    pub async fn admit(
        &self,
        store: &dyn ChatStore,
        user_id: i64,
        content: &str,
    ) -> Result<(), JieyouError> {
        self.check_content(content)?;

        let used = store
            .count_user_turns_since(user_id, &store::start_of_day())
            .await?;
        if used >= self.max_chats_per_day as usize {
            return Err(JieyouError::LimitExceeded {
                limit: self.max_chats_per_day,
            });
        }
        Ok(())
    }
}
