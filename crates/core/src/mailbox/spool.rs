//! Spool directory mailbox.
//!
//! Each message is an RFC 5322 file named `<uid>.eml`. Flagging drops a
//! `<uid>.flagged` marker beside the message; deleting removes both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use mail_parser::{MessageParser, MimeHeaders};
use tracing::{debug, warn};

use super::{business_from_address, Attachment, Mailbox, MailboxError, MessageMetadata};
use crate::config::SpoolConfig;
use crate::cursor::Uid;

const MESSAGE_EXT: &str = "eml";
const FLAG_EXT: &str = "flagged";

/// Mailbox backed by a spool directory.
#[derive(Debug, Clone)]
pub struct SpoolMailbox {
    root: PathBuf,
}

impl SpoolMailbox {
    pub fn new(config: &SpoolConfig) -> Self {
        Self {
            root: config.path.clone(),
        }
    }

    /// Path of the message file for `uid`.
    pub fn message_path(&self, uid: Uid) -> PathBuf {
        self.root.join(format!("{}.{}", uid, MESSAGE_EXT))
    }

    fn flag_path(&self, uid: Uid) -> PathBuf {
        self.root.join(format!("{}.{}", uid, FLAG_EXT))
    }

    /// Whether `uid` carries a flag marker.
    pub fn is_flagged(&self, uid: Uid) -> bool {
        self.flag_path(uid).exists()
    }

    /// Run blocking filesystem work off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(SpoolMailbox) -> Result<T, MailboxError> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| MailboxError::Unavailable(format!("spool task failed: {}", e)))?
    }

    fn read_message(&self, uid: Uid) -> Result<Vec<u8>, MailboxError> {
        match std::fs::read(self.message_path(uid)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MailboxError::NotFound(uid)),
            Err(e) => Err(MailboxError::Io(e)),
        }
    }

    fn scan_dir(root: &Path, from: Uid) -> Result<Vec<Uid>, MailboxError> {
        let mut uids = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MESSAGE_EXT) {
                continue;
            }
            let Some(uid) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<Uid>().ok())
            else {
                continue;
            };
            if uid >= from {
                uids.push(uid);
            }
        }
        uids.sort_unstable();
        Ok(uids)
    }

    fn parse_metadata(uid: Uid, raw: &[u8]) -> Result<MessageMetadata, MailboxError> {
        let message = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| MailboxError::Parse {
                uid,
                reason: "not an RFC 5322 message".to_string(),
            })?;

        let business = message
            .from()
            .and_then(|addr| addr.first())
            .and_then(|a| a.address())
            .map(business_from_address)
            .unwrap_or_default();

        Ok(MessageMetadata {
            business,
            subject: message.subject().unwrap_or_default().trim().to_string(),
        })
    }

    fn parse_attachment(uid: Uid, raw: &[u8]) -> Result<Attachment, MailboxError> {
        let message = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| MailboxError::Parse {
                uid,
                reason: "not an RFC 5322 message".to_string(),
            })?;

        let attachments: Vec<Attachment> = message
            .attachments()
            .enumerate()
            .map(|(idx, part)| {
                let content_type = MimeHeaders::content_type(part)
                    .map(|ct| match ct.subtype() {
                        Some(sub) => format!("{}/{}", ct.ctype(), sub),
                        None => ct.ctype().to_string(),
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let file_name = MimeHeaders::attachment_name(part)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("{}-attachment-{}", uid, idx + 1));
                Attachment {
                    file_name,
                    content_type,
                    bytes: part.contents().to_vec(),
                }
            })
            .collect();

        let position = attachments.iter().position(Attachment::is_pdf).unwrap_or(0);
        attachments
            .into_iter()
            .nth(position)
            .ok_or(MailboxError::NoAttachment(uid))
    }
}

#[async_trait]
impl Mailbox for SpoolMailbox {
    fn name(&self) -> &str {
        "spool"
    }

    async fn list_uids(&self, from: Uid) -> Result<Vec<Uid>, MailboxError> {
        self.blocking(move |this| Self::scan_dir(&this.root, from))
            .await
    }

    async fn extract_minimal_metadata(
        &self,
        uids: &[Uid],
    ) -> Result<BTreeMap<Uid, MessageMetadata>, MailboxError> {
        let uids = uids.to_vec();
        self.blocking(move |this| {
            let mut metadata = BTreeMap::new();
            for uid in uids {
                let raw = match this.read_message(uid) {
                    Ok(raw) => raw,
                    Err(MailboxError::NotFound(_)) => {
                        debug!(uid, "Message vanished before metadata extraction");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let meta = Self::parse_metadata(uid, &raw).inspect_err(|e| {
                    warn!(uid, "Unreadable message blocks the scan: {}", e);
                })?;
                metadata.insert(uid, meta);
            }
            Ok(metadata)
        })
        .await
    }

    async fn fetch_attachment(&self, uid: Uid) -> Result<Attachment, MailboxError> {
        self.blocking(move |this| {
            let raw = this.read_message(uid)?;
            Self::parse_attachment(uid, &raw)
        })
        .await
    }

    async fn flag(&self, uid: Uid) -> Result<(), MailboxError> {
        self.blocking(move |this| {
            if !this.message_path(uid).exists() {
                return Err(MailboxError::NotFound(uid));
            }
            std::fs::write(this.flag_path(uid), Utc::now().to_rfc3339())?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, uid: Uid) -> Result<(), MailboxError> {
        self.blocking(move |this| {
            match std::fs::remove_file(this.message_path(uid)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(MailboxError::NotFound(uid));
                }
                Err(e) => return Err(MailboxError::Io(e)),
            }
            match std::fs::remove_file(this.flag_path(uid)) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(MailboxError::Io(e)),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    fn spool(dir: &TempDir) -> SpoolMailbox {
        SpoolMailbox::new(&SpoolConfig {
            path: dir.path().to_path_buf(),
        })
    }

    fn write(dir: &TempDir, name: &str, content: &str) {
        std::fs::write(dir.path().join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_list_uids_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let eml = fixtures::eml("billing@acme.com", "Invoice 1", Some("a.pdf"));
        write(&dir, "12.eml", &eml);
        write(&dir, "3.eml", &eml);
        write(&dir, "40.eml", &eml);
        write(&dir, "7.flagged", "x");
        write(&dir, "notes.txt", "x");
        write(&dir, "draft.eml", &eml);

        let mailbox = spool(&dir);
        assert_eq!(mailbox.list_uids(0).await.unwrap(), vec![3, 12, 40]);
        assert_eq!(mailbox.list_uids(12).await.unwrap(), vec![12, 40]);
        assert!(mailbox.list_uids(41).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extract_metadata() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "5.eml",
            &fixtures::eml("Billing <billing@ACME.com>", "Invoice 2024-001", Some("a.pdf")),
        );

        let mailbox = spool(&dir);
        let meta = mailbox.extract_minimal_metadata(&[5, 7]).await.unwrap();

        let first = meta.get(&5).unwrap();
        assert_eq!(first.business, "acme.com");
        assert_eq!(first.subject, "Invoice 2024-001");
        assert!(!meta.contains_key(&7));
    }

    #[tokio::test]
    async fn test_extract_metadata_fails_on_unparseable_message() {
        let dir = TempDir::new().unwrap();
        write(&dir, "5.eml", &fixtures::eml("billing@acme.com", "Invoice", None));
        write(&dir, "6.eml", "");

        let err = spool(&dir)
            .extract_minimal_metadata(&[5, 6])
            .await
            .unwrap_err();
        assert!(matches!(err, MailboxError::Parse { uid: 6, .. }));
    }

    #[tokio::test]
    async fn test_fetch_pdf_attachment() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "9.eml",
            &fixtures::eml("billing@acme.com", "Invoice", Some("INV-9.pdf")),
        );

        let attachment = spool(&dir).fetch_attachment(9).await.unwrap();
        assert_eq!(attachment.file_name, "INV-9.pdf");
        assert!(attachment.is_pdf());
        assert!(attachment.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_fetch_without_attachment_fails() {
        let dir = TempDir::new().unwrap();
        write(&dir, "9.eml", &fixtures::eml("billing@acme.com", "Hello", None));

        let err = spool(&dir).fetch_attachment(9).await.unwrap_err();
        assert!(matches!(err, MailboxError::NoAttachment(9)));
    }

    #[tokio::test]
    async fn test_flag_then_delete() {
        let dir = TempDir::new().unwrap();
        write(&dir, "21.eml", &fixtures::eml("a@b.com", "s", None));
        let mailbox = spool(&dir);

        mailbox.flag(21).await.unwrap();
        assert!(mailbox.is_flagged(21));
        assert_eq!(mailbox.list_uids(0).await.unwrap(), vec![21]);

        mailbox.delete(21).await.unwrap();
        assert!(!mailbox.is_flagged(21));
        assert!(mailbox.list_uids(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flag_and_delete_missing_message() {
        let dir = TempDir::new().unwrap();
        let mailbox = spool(&dir);
        assert!(matches!(
            mailbox.flag(1).await.unwrap_err(),
            MailboxError::NotFound(1)
        ));
        assert!(matches!(
            mailbox.delete(1).await.unwrap_err(),
            MailboxError::NotFound(1)
        ));
    }

    #[tokio::test]
    async fn test_missing_spool_dir_is_listing_error() {
        let mailbox = SpoolMailbox::new(&SpoolConfig {
            path: PathBuf::from("/nonexistent/spool"),
        });
        assert!(matches!(
            mailbox.list_uids(0).await.unwrap_err(),
            MailboxError::Io(_)
        ));
    }
}
