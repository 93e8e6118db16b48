//! Outbox directory transfer.
//!
//! Layout: `<root>/idoc/<file>.xml` and `<root>/pdf/<uid>_<file>.pdf`. Each
//! file is written as `<name>.part` and renamed once complete, so a reader
//! polling the outbox never sees a partial document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Transfer, TransferError, TransferSession};
use crate::idoc::Idoc;
use crate::invoice::Invoice;

const IDOC_DIR: &str = "idoc";
const PDF_DIR: &str = "pdf";

/// Transfer writing into a local (or mounted) outbox directory.
#[derive(Debug, Clone)]
pub struct DirectoryTransfer {
    root: PathBuf,
}

impl DirectoryTransfer {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn idoc_dir(&self) -> PathBuf {
        self.root.join(IDOC_DIR)
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join(PDF_DIR)
    }
}

#[async_trait]
impl Transfer for DirectoryTransfer {
    fn name(&self) -> &str {
        "directory"
    }

    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
        for dir in [self.idoc_dir(), self.pdf_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| TransferError::Connect(format!("{}: {}", dir.display(), e)))?;
        }
        debug!(root = %self.root.display(), "Transfer session opened");
        Ok(Box::new(DirectorySession {
            transfer: self.clone(),
            open: true,
        }))
    }
}

struct DirectorySession {
    transfer: DirectoryTransfer,
    open: bool,
}

impl DirectorySession {
    fn ensure_open(&self) -> Result<(), TransferError> {
        if self.open {
            Ok(())
        } else {
            Err(TransferError::Closed)
        }
    }

    async fn write_atomic(&self, target: PathBuf, bytes: &[u8]) -> Result<(), TransferError> {
        let file = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let upload_err = |e: std::io::Error| TransferError::Upload {
            file: file.clone(),
            reason: e.to_string(),
        };

        let mut part = target.clone().into_os_string();
        part.push(".part");
        let part = PathBuf::from(part);

        tokio::fs::write(&part, bytes).await.map_err(upload_err)?;
        if let Err(e) = tokio::fs::rename(&part, &target).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(upload_err(e));
        }
        info!(path = %target.display(), bytes = bytes.len(), "Uploaded");
        Ok(())
    }
}

/// Keep only characters that are safe in a file name.
fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

#[async_trait]
impl TransferSession for DirectorySession {
    async fn upload_idoc(&mut self, idoc: &Idoc) -> Result<(), TransferError> {
        self.ensure_open()?;
        let xml = idoc.to_xml().map_err(|e| TransferError::Upload {
            file: idoc.file_name.clone(),
            reason: e.to_string(),
        })?;
        let target = self.transfer.idoc_dir().join(safe_file_name(&idoc.file_name));
        self.write_atomic(target, xml.as_bytes()).await
    }

    async fn upload_pdf(&mut self, invoice: &Invoice) -> Result<(), TransferError> {
        self.ensure_open()?;
        let attachment = invoice
            .attachment
            .as_ref()
            .ok_or(TransferError::MissingDocument(invoice.uid))?;
        let name = format!("{}_{}", invoice.uid, safe_file_name(&attachment.file_name));
        let target = self.transfer.pdf_dir().join(name);
        self.write_atomic(target, &attachment.bytes).await
    }

    async fn disconnect(&mut self) -> Result<(), TransferError> {
        self.ensure_open()?;
        self.open = false;
        debug!("Transfer session closed");
        Ok(())
    }
}
