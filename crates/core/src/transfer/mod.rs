//! Document transfer: ships assembled IDOCs and source PDFs.

mod directory;

pub use directory::DirectoryTransfer;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{TransferBackend, TransferConfig};
use crate::idoc::Idoc;
use crate::invoice::Invoice;

/// Errors from transfer backends.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("upload of {file} failed: {reason}")]
    Upload { file: String, reason: String },

    #[error("disconnect failed: {0}")]
    Disconnect(String),

    #[error("invoice {0} has no document to upload")]
    MissingDocument(u32),

    #[error("session already closed")]
    Closed,

    #[error("transfer not configured: {0}")]
    NotConfigured(String),
}

/// Opens delivery sessions.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Returns the name of this transfer implementation.
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError>;
}

/// One open delivery session.
#[async_trait]
pub trait TransferSession: Send {
    async fn upload_idoc(&mut self, idoc: &Idoc) -> Result<(), TransferError>;

    /// Upload the invoice's original attachment.
    async fn upload_pdf(&mut self, invoice: &Invoice) -> Result<(), TransferError>;

    async fn disconnect(&mut self) -> Result<(), TransferError>;
}

/// Create the configured transfer backend.
pub fn create_transfer(config: &TransferConfig) -> Result<Arc<dyn Transfer>, TransferError> {
    match config.backend {
        TransferBackend::Directory => {
            let dir = config.directory.as_ref().ok_or_else(|| {
                TransferError::NotConfigured("transfer.directory section missing".to_string())
            })?;
            Ok(Arc::new(DirectoryTransfer::new(&dir.path)))
        }
    }
}
