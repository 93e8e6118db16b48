//! The mailbox cursor ("slider").
//!
//! A single low-water-mark uid shared between the pipeline worker and the
//! control API. The worker only ever moves it forward, and only while no
//! operator write has happened since the scan started; operator writes may
//! move it anywhere (rewind to replay, skip ahead to ignore).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Mailbox-assigned unique message id.
pub type Uid = u32;

/// Cursor value as observed at a point in time.
///
/// `generation` changes on every operator write, so the worker can tell
/// whether the value it read at scan start is still the operator's intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSnapshot {
    pub value: Uid,
    pub generation: u64,
}

#[derive(Debug)]
struct CursorState {
    value: Uid,
    generation: u64,
}

/// Shared, mutually exclusive cursor store.
#[derive(Debug, Clone)]
pub struct CursorStore {
    inner: Arc<RwLock<CursorState>>,
}

impl CursorStore {
    /// Create a cursor starting at `initial`.
    pub fn new(initial: Uid) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CursorState {
                value: initial,
                generation: 0,
            })),
        }
    }

    /// Current cursor value.
    pub async fn get(&self) -> Uid {
        self.inner.read().await.value
    }

    /// Operator write. Returns the stored value.
    pub async fn set(&self, value: Uid) -> Uid {
        let mut state = self.inner.write().await;
        state.value = value;
        state.generation += 1;
        value
    }

    /// Read value and generation together.
    pub async fn snapshot(&self) -> CursorSnapshot {
        let state = self.inner.read().await;
        CursorSnapshot {
            value: state.value,
            generation: state.generation,
        }
    }

    /// Move the cursor past `uid` after it reached a terminal outcome.
    ///
    /// No-op (returns false) if an operator wrote the cursor since `since` was
    /// taken, or if the cursor is already beyond `uid`.
    pub async fn advance_past(&self, uid: Uid, since: &CursorSnapshot) -> bool {
        let mut state = self.inner.write().await;
        if state.generation != since.generation {
            return false;
        }
        let next = uid.saturating_add(1);
        if next <= state.value {
            return false;
        }
        state.value = next;
        true
    }
}

impl Default for CursorStore {
    fn default() -> Self {
        Self::new(1)
    }
}
