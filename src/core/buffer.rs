// src/core/buffer.rs — Append-only delta buffer shared by one worker and many relays
//
// Lengths and offsets are counted in chars. The completion flag sits under
// the same lock as the fragments, so one read sees "completed" together with
// the final fragment list.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct BufferState {
    fragments: Vec<String>,
    /// `ends[i]` = char offset just past fragment `i`.
    ends: Vec<usize>,
    completed: bool,
    error: Option<String>,
}

impl BufferState {
    fn len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }
}

/// What a reader gets back from [`DeltaBuffer::read_from`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Fragments after the requested offset, in append order. The first one
    /// is trimmed when the offset falls inside it.
    pub fragments: Vec<String>,
    /// Offset the read actually started at (after clamping).
    pub start: usize,
    /// Buffer length at the time of the read.
    pub end: usize,
    pub completed: bool,
    pub error: Option<String>,
}

impl Snapshot {
    pub fn text(&self) -> String {
        self.fragments.concat()
    }
}

#[derive(Debug, Default)]
pub struct DeltaBuffer {
    state: RwLock<BufferState>,
    changed: Notify,
}

impl DeltaBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BufferState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BufferState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a fragment and return the new length. Empty fragments and
    /// appends after completion are ignored.
    pub fn append(&self, fragment: &str) -> usize {
        let len = {
            let mut state = self.write();
            if state.completed || fragment.is_empty() {
                if state.completed {
                    tracing::warn!("Dropping fragment appended after completion");
                }
                return state.len();
            }
            let end = state.len() + fragment.chars().count();
            state.fragments.push(fragment.to_string());
            state.ends.push(end);
            end
        };
        self.changed.notify_waiters();
        len
    }

    /// Mark the buffer finished. Only the first call has an effect.
    pub fn complete(&self, error: Option<String>) {
        {
            let mut state = self.write();
            if state.completed {
                return;
            }
            state.completed = true;
            state.error = error;
        }
        self.changed.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fragment_count(&self) -> usize {
        self.read().fragments.len()
    }

    pub fn is_completed(&self) -> bool {
        self.read().completed
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    /// The whole accumulated text.
    pub fn text(&self) -> String {
        self.read().fragments.concat()
    }

    /// Everything after `offset`. Offsets past the end are clamped.
    pub fn read_from(&self, offset: usize) -> Snapshot {
        let state = self.read();
        let end = state.len();
        let start = offset.min(end);

        let first = state.ends.partition_point(|&e| e <= start);
        let mut fragments = Vec::with_capacity(state.fragments.len() - first);
        for idx in first..state.fragments.len() {
            let fragment = &state.fragments[idx];
            let fragment_start = if idx == 0 { 0 } else { state.ends[idx - 1] };
            if idx == first && start > fragment_start {
                fragments.push(fragment.chars().skip(start - fragment_start).collect());
            } else {
                fragments.push(fragment.clone());
            }
        }

        Snapshot {
            fragments,
            start,
            end,
            completed: state.completed,
            error: state.error.clone(),
        }
    }

    /// Wait until the buffer grows past `seen_len` or completes, or until
    /// `poll` elapses, whichever comes first.
    pub async fn wait_for_change(&self, seen_len: usize, poll: Duration) {
        let notified = self.changed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        {
            let state = self.read();
            if state.completed || state.len() != seen_len {
                return;
            }
        }

        let _ = tokio::time::timeout(poll, notified).await;
    }
}
