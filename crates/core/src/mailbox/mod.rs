//! Mailbox queue adapter.
//!
//! The mailbox is the system of record for pending work: a message that is
//! still present and at or past the cursor is still to be processed.

mod spool;

pub use spool::SpoolMailbox;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{MailboxBackend, MailboxConfig};
use crate::cursor::Uid;

/// The minimal metadata the pipeline needs before fetching a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Sending business (the sender's mail domain for spool mailboxes).
    pub business: String,
    pub subject: String,
}

/// The document attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Whether this looks like a PDF document.
    pub fn is_pdf(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("application/pdf")
            || self.file_name.to_ascii_lowercase().ends_with(".pdf")
    }
}

/// Errors from mailbox backends.
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("message {0} not found")]
    NotFound(Uid),

    #[error("message {uid} could not be parsed: {reason}")]
    Parse { uid: Uid, reason: String },

    #[error("message {0} has no attachment")]
    NoAttachment(Uid),

    #[error("mailbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mailbox unavailable: {0}")]
    Unavailable(String),
}

/// Operations the pipeline needs from the mailbox, keyed by uid.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Returns the name of this mailbox implementation.
    fn name(&self) -> &str;

    /// Uids at or past `from`, ascending.
    async fn list_uids(&self, from: Uid) -> Result<Vec<Uid>, MailboxError>;

    /// Business and subject for each uid. Uids that vanished or cannot be
    /// read are left out of the map.
    async fn extract_minimal_metadata(
        &self,
        uids: &[Uid],
    ) -> Result<BTreeMap<Uid, MessageMetadata>, MailboxError>;

    /// The document attached to `uid`.
    async fn fetch_attachment(&self, uid: Uid) -> Result<Attachment, MailboxError>;

    /// Mark `uid` for manual attention without removing it.
    async fn flag(&self, uid: Uid) -> Result<(), MailboxError>;

    /// Remove `uid` from the mailbox.
    async fn delete(&self, uid: Uid) -> Result<(), MailboxError>;
}

/// Create the configured mailbox backend.
pub fn create_mailbox(config: &MailboxConfig) -> Result<Arc<dyn Mailbox>, MailboxError> {
    match config.backend {
        MailboxBackend::Spool => {
            let spool = config.spool.as_ref().ok_or_else(|| {
                MailboxError::Unavailable("mailbox.spool section missing".to_string())
            })?;
            Ok(Arc::new(SpoolMailbox::new(spool)))
        }
    }
}

/// Extract the business (sender domain) from an address like `billing@acme.com`.
pub fn business_from_address(address: &str) -> String {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or(address)
        .trim()
        .trim_end_matches('>')
        .to_ascii_lowercase()
}
