//! Queue mirror: an externally readable view of in-flight messages.
//!
//! The worker upserts an entry when a uid is first seen in a scan and removes
//! it once the message reaches a terminal outcome. The control API only reads.
//! The mailbox stays authoritative; losing the mirror loses nothing but the view.

mod memory;
mod sqlite;

pub use memory::InMemoryMirror;
pub use sqlite::SqliteMirror;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{MirrorBackend, MirrorConfig};
use crate::cursor::Uid;

/// Metadata kept for one in-flight message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEntry {
    pub uid: Uid,
    pub business: String,
    pub subject: String,
}

/// Errors from mirror backends.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror storage error: {0}")]
    Storage(String),

    #[error("mirror is not configured: {0}")]
    NotConfigured(String),
}

/// Concurrent-safe store behind the mirror.
#[async_trait]
pub trait QueueMirror: Send + Sync {
    /// Returns the name of this backend.
    fn name(&self) -> &str;

    /// Insert or replace the entry for `entry.uid`.
    async fn upsert(&self, entry: MirrorEntry) -> Result<(), MirrorError>;

    /// Remove the entry for `uid`. Removing a missing uid is not an error.
    async fn remove(&self, uid: Uid) -> Result<(), MirrorError>;

    /// All entries, ordered by uid.
    async fn list_all(&self) -> Result<Vec<MirrorEntry>, MirrorError>;

    /// Number of entries.
    async fn len(&self) -> Result<usize, MirrorError> {
        Ok(self.list_all().await?.len())
    }
}

/// Build the configured mirror backend.
pub fn create_mirror(config: &MirrorConfig) -> Result<Arc<dyn QueueMirror>, MirrorError> {
    match config.backend {
        MirrorBackend::Memory => Ok(Arc::new(InMemoryMirror::new())),
        MirrorBackend::Sqlite => {
            let path = config.path.as_ref().ok_or_else(|| {
                MirrorError::NotConfigured("sqlite mirror requires a path".to_string())
            })?;
            Ok(Arc::new(SqliteMirror::new(path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_mirror() {
        let mirror = create_mirror(&MirrorConfig::default()).unwrap();
        assert_eq!(mirror.name(), "memory");
    }

    #[test]
    fn test_create_sqlite_mirror_requires_path() {
        let config = MirrorConfig {
            backend: MirrorBackend::Sqlite,
            path: None,
        };
        let err = create_mirror(&config).err().unwrap();
        assert!(matches!(err, MirrorError::NotConfigured(_)));
    }

    #[test]
    fn test_entry_serialization() {
        let entry = MirrorEntry {
            uid: 101,
            business: "acme.com".to_string(),
            subject: "Invoice 2024-001".to_string(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["uid"], 101);
        assert_eq!(json["business"], "acme.com");
        assert_eq!(json["subject"], "Invoice 2024-001");
    }
}
