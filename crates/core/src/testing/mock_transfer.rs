//! Mock transfer for testing.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cursor::Uid;
use crate::idoc::Idoc;
use crate::invoice::Invoice;
use crate::transfer::{Transfer, TransferError, TransferSession};

/// A step of the delivery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStep {
    Connect,
    UploadIdoc,
    UploadPdf,
    Disconnect,
}

#[derive(Debug, Default)]
struct TransferLog {
    connect_attempts: usize,
    disconnect_attempts: usize,
    idocs: Vec<Uid>,
    idoc_bodies: Vec<String>,
    pdfs: Vec<Uid>,
    failing: HashSet<TransferStep>,
}

/// Mock implementation of the Transfer trait.
///
/// Records every session step; any step can be made to fail until
/// [`MockTransfer::clear_failures`] is called.
#[derive(Debug, Default)]
pub struct MockTransfer {
    log: Arc<RwLock<TransferLog>>,
}

impl MockTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `step` fail.
    pub async fn fail_on(&self, step: TransferStep) {
        self.log.write().await.failing.insert(step);
    }

    pub async fn clear_failures(&self) {
        self.log.write().await.failing.clear();
    }

    pub async fn connect_count(&self) -> usize {
        self.log.read().await.connect_attempts
    }

    pub async fn disconnect_count(&self) -> usize {
        self.log.read().await.disconnect_attempts
    }

    /// Uids whose IDOC was uploaded.
    pub async fn uploaded_idocs(&self) -> Vec<Uid> {
        self.log.read().await.idocs.clone()
    }

    /// Uploaded IDOC documents.
    pub async fn uploaded_idoc_bodies(&self) -> Vec<String> {
        self.log.read().await.idoc_bodies.clone()
    }

    /// Uids whose PDF was uploaded.
    pub async fn uploaded_pdfs(&self) -> Vec<Uid> {
        self.log.read().await.pdfs.clone()
    }
}

#[async_trait]
impl Transfer for MockTransfer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
        let mut log = self.log.write().await;
        log.connect_attempts += 1;
        if log.failing.contains(&TransferStep::Connect) {
            return Err(TransferError::Connect("mock connect failure".to_string()));
        }
        Ok(Box::new(MockSession {
            log: Arc::clone(&self.log),
        }))
    }
}

struct MockSession {
    log: Arc<RwLock<TransferLog>>,
}

#[async_trait]
impl TransferSession for MockSession {
    async fn upload_idoc(&mut self, idoc: &Idoc) -> Result<(), TransferError> {
        let mut log = self.log.write().await;
        if log.failing.contains(&TransferStep::UploadIdoc) {
            return Err(TransferError::Upload {
                file: idoc.file_name.clone(),
                reason: "mock upload failure".to_string(),
            });
        }
        let xml = idoc.to_xml().map_err(|e| TransferError::Upload {
            file: idoc.file_name.clone(),
            reason: e.to_string(),
        })?;
        log.idocs.push(idoc.uid);
        log.idoc_bodies.push(xml);
        Ok(())
    }

    async fn upload_pdf(&mut self, invoice: &Invoice) -> Result<(), TransferError> {
        let mut log = self.log.write().await;
        if log.failing.contains(&TransferStep::UploadPdf) {
            return Err(TransferError::Upload {
                file: format!("{}.pdf", invoice.uid),
                reason: "mock upload failure".to_string(),
            });
        }
        if invoice.attachment.is_none() {
            return Err(TransferError::MissingDocument(invoice.uid));
        }
        log.pdfs.push(invoice.uid);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransferError> {
        let mut log = self.log.write().await;
        log.disconnect_attempts += 1;
        if log.failing.contains(&TransferStep::Disconnect) {
            return Err(TransferError::Disconnect("mock disconnect failure".to_string()));
        }
        Ok(())
    }
}
