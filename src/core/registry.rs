// src/core/registry.rs — Live generation sessions keyed by (user, message)

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::buffer::DeltaBuffer;

/// Identifies one logical generation request; stable across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: i64,
    pub msg_id: String,
}

impl SessionKey {
    pub fn new(user_id: i64, msg_id: impl Into<String>) -> Self {
        Self {
            user_id,
            msg_id: msg_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.user_id, self.msg_id)
    }
}

/// One in-flight generation. Mutated only by its worker.
#[derive(Debug)]
pub struct Session {
    pub key: SessionKey,
    pub buffer: DeltaBuffer,
    pub started_at: Instant,
}

impl Session {
    fn new(key: SessionKey) -> Self {
        Self {
            key,
            buffer: DeltaBuffer::new(),
            started_at: Instant::now(),
        }
    }
}

/// At most one live session per key. The caller that creates the session is
/// its owner and must start the worker; everyone else only reads.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the live session for `key`, creating it if absent. The bool is
    /// true only for the caller that created it.
    pub fn acquire(&self, key: &SessionKey) -> (Arc<Session>, bool) {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(key) {
            return (existing.clone(), false);
        }
        let session = Arc::new(Session::new(key.clone()));
        sessions.insert(key.clone(), session.clone());
        tracing::debug!(session = %key, "Session created");
        (session, true)
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.lock().get(key).cloned()
    }

    pub fn release(&self, key: &SessionKey) {
        if let Some(session) = self.lock().remove(key) {
            tracing::debug!(
                session = %key,
                elapsed_ms = session.started_at.elapsed().as_millis() as u64,
                "Session released"
            );
        }
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_acquire_owns() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new(1, "m1");

        let (a, a_owner) = registry.acquire(&key);
        let (b, b_owner) = registry.acquire(&key);
        assert!(a_owner);
        assert!(!b_owner);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let registry = SessionRegistry::new();
        let (_, first) = registry.acquire(&SessionKey::new(1, "m1"));
        let (_, other_msg) = registry.acquire(&SessionKey::new(1, "m2"));
        let (_, other_user) = registry.acquire(&SessionKey::new(2, "m1"));
        assert!(first && other_msg && other_user);
        assert_eq!(registry.live_count(), 3);
    }

    #[test]
    fn test_release_then_reacquire_makes_new_owner() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new(7, "m");
        let (old, _) = registry.acquire(&key);
        registry.release(&key);
        assert!(registry.get(&key).is_none());

        let (new, owner) = registry.acquire(&key);
        assert!(owner);
        assert!(!Arc::ptr_eq(&old, &new));
    }

    #[test]
    fn test_release_unknown_key_is_noop() {
        let registry = SessionRegistry::new();
        registry.release(&SessionKey::new(1, "missing"));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_concurrent_acquire_single_owner() {
        let registry = Arc::new(SessionRegistry::new());
        let key = SessionKey::new(42, "race");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let key = key.clone();
                std::thread::spawn(move || registry.acquire(&key).1)
            })
            .collect();

        let owners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|owner| *owner)
            .count();
        assert_eq!(owners, 1);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(SessionKey::new(3, "abc").to_string(), "3:abc");
    }
}
