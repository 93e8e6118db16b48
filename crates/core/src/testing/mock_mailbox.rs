//! Mock mailbox for testing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::fixtures;
use crate::cursor::Uid;
use crate::mailbox::{Attachment, Mailbox, MailboxError, MessageMetadata};

/// A message held by [`MockMailbox`].
#[derive(Debug, Clone)]
pub struct MockMessage {
    pub metadata: MessageMetadata,
    pub attachment: Option<Attachment>,
}

/// Mock implementation of the Mailbox trait.
///
/// Provides controllable behavior for testing:
/// - Seed messages with or without a PDF
/// - Track flags, deletions and listing calls
/// - Fail the next listing, or deletion of specific uids
#[derive(Debug, Default)]
pub struct MockMailbox {
    messages: Arc<RwLock<BTreeMap<Uid, MockMessage>>>,
    flagged: Arc<RwLock<BTreeSet<Uid>>>,
    deleted: Arc<RwLock<Vec<Uid>>>,
    /// `from` argument of each listing call.
    list_calls: Arc<RwLock<Vec<Uid>>>,
    /// If set, the next listing fails with this error.
    next_list_error: Arc<RwLock<Option<MailboxError>>>,
    /// Uids whose deletion fails.
    undeletable: Arc<RwLock<BTreeSet<Uid>>>,
}

impl MockMailbox {
    /// Create an empty mock mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message, with a PDF attachment if `with_pdf`.
    pub async fn add_message(&self, uid: Uid, metadata: MessageMetadata, with_pdf: bool) {
        let attachment = with_pdf.then(|| fixtures::pdf_attachment(&format!("{}.pdf", uid)));
        self.messages.write().await.insert(
            uid,
            MockMessage {
                metadata,
                attachment,
            },
        );
    }

    /// Whether `uid` is still in the mailbox.
    pub async fn contains(&self, uid: Uid) -> bool {
        self.messages.read().await.contains_key(&uid)
    }

    /// Uids deleted so far, in order.
    pub async fn deleted(&self) -> Vec<Uid> {
        self.deleted.read().await.clone()
    }

    /// Uids currently flagged.
    pub async fn flagged(&self) -> Vec<Uid> {
        self.flagged.read().await.iter().copied().collect()
    }

    /// `from` values of every listing call.
    pub async fn list_calls(&self) -> Vec<Uid> {
        self.list_calls.read().await.clone()
    }

    /// Configure the next listing to fail with the given error.
    pub async fn set_next_list_error(&self, error: MailboxError) {
        *self.next_list_error.write().await = Some(error);
    }

    /// Make deletion of `uid` fail.
    pub async fn fail_delete(&self, uid: Uid) {
        self.undeletable.write().await.insert(uid);
    }
}

#[async_trait]
impl Mailbox for MockMailbox {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_uids(&self, from: Uid) -> Result<Vec<Uid>, MailboxError> {
        self.list_calls.write().await.push(from);
        if let Some(error) = self.next_list_error.write().await.take() {
            return Err(error);
        }
        Ok(self
            .messages
            .read()
            .await
            .range(from..)
            .map(|(uid, _)| *uid)
            .collect())
    }

    async fn extract_minimal_metadata(
        &self,
        uids: &[Uid],
    ) -> Result<BTreeMap<Uid, MessageMetadata>, MailboxError> {
        let messages = self.messages.read().await;
        Ok(uids
            .iter()
            .filter_map(|uid| messages.get(uid).map(|m| (*uid, m.metadata.clone())))
            .collect())
    }

    async fn fetch_attachment(&self, uid: Uid) -> Result<Attachment, MailboxError> {
        let messages = self.messages.read().await;
        let message = messages.get(&uid).ok_or(MailboxError::NotFound(uid))?;
        message
            .attachment
            .clone()
            .ok_or(MailboxError::NoAttachment(uid))
    }

    async fn flag(&self, uid: Uid) -> Result<(), MailboxError> {
        if !self.messages.read().await.contains_key(&uid) {
            return Err(MailboxError::NotFound(uid));
        }
        self.flagged.write().await.insert(uid);
        Ok(())
    }

    async fn delete(&self, uid: Uid) -> Result<(), MailboxError> {
        if self.undeletable.read().await.contains(&uid) {
            return Err(MailboxError::Unavailable(format!("cannot delete {}", uid)));
        }
        if self.messages.write().await.remove(&uid).is_none() {
            return Err(MailboxError::NotFound(uid));
        }
        self.flagged.write().await.remove(&uid);
        self.deleted.write().await.push(uid);
        Ok(())
    }
}
