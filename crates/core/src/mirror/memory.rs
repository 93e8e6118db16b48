//! In-process mirror backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MirrorEntry, MirrorError, QueueMirror};
use crate::cursor::Uid;

/// Mirror held in memory. Readable only through the control API.
#[derive(Debug, Default)]
pub struct InMemoryMirror {
    entries: RwLock<BTreeMap<Uid, MirrorEntry>>,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueMirror for InMemoryMirror {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, entry: MirrorEntry) -> Result<(), MirrorError> {
        self.entries.write().await.insert(entry.uid, entry);
        Ok(())
    }

    async fn remove(&self, uid: Uid) -> Result<(), MirrorError> {
        self.entries.write().await.remove(&uid);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<MirrorEntry>, MirrorError> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn len(&self) -> Result<usize, MirrorError> {
        Ok(self.entries.read().await.len())
    }
}
