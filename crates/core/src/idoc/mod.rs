//! IDOC assembly: the outgoing document built from template segments.

mod template;

pub use template::{IdocTemplate, TemplateAssembler};

use thiserror::Error;

use crate::cursor::Uid;
use crate::invoice::Invoice;

/// Errors while assembling an IDOC.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("template segment {path} unreadable: {reason}")]
    Template { path: String, reason: String },

    #[error("template references unknown field: {0}")]
    MissingField(String),

    #[error("invoice {0} is not classified")]
    Unclassified(Uid),

    #[error("idoc {0} has not been configured")]
    NotConfigured(String),
}

/// An outgoing document for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Idoc {
    pub uid: Uid,
    pub file_name: String,
    /// Static header segment
    pub start: String,
    /// Rendered dynamic segment, set by [`IdocAssembler::configure_idoc`]
    pub body: Option<String>,
    /// Static trailer segment
    pub end: String,
}

impl Idoc {
    pub fn new(uid: Uid, file_name: impl Into<String>) -> Self {
        Self {
            uid,
            file_name: file_name.into(),
            start: String::new(),
            body: None,
            end: String::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.body.is_some()
    }

    /// The full document: start, dynamic and end segments.
    pub fn to_xml(&self) -> Result<String, AssemblyError> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| AssemblyError::NotConfigured(self.file_name.clone()))?;
        Ok(format!("{}{}{}", self.start, body, self.end))
    }
}

/// Builds IDOCs from classified invoices.
pub trait IdocAssembler: Send + Sync {
    /// Returns the name of this assembler implementation.
    fn name(&self) -> &str;

    /// An empty document for `uid`.
    fn new_idoc(&self, uid: Uid) -> Idoc;

    /// Fill `idoc` from `invoice`.
    fn configure_idoc(&self, idoc: &mut Idoc, invoice: &Invoice) -> Result<(), AssemblyError>;
}
