//! Mock IDOC assembler for testing.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::cursor::Uid;
use crate::idoc::{AssemblyError, Idoc, IdocAssembler};
use crate::invoice::Invoice;

/// Mock implementation of the IdocAssembler trait.
///
/// Renders a one-line document carrying the uid and invoice type.
#[derive(Debug, Default)]
pub struct MockAssembler {
    configured: Mutex<Vec<Uid>>,
    failing: Mutex<HashSet<Uid>>,
}

impl MockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make assembly of `uid` fail.
    pub fn fail_for(&self, uid: Uid) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uid);
    }

    /// Uids configured so far.
    pub fn configured(&self) -> Vec<Uid> {
        self.configured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl IdocAssembler for MockAssembler {
    fn name(&self) -> &str {
        "mock"
    }

    fn new_idoc(&self, uid: Uid) -> Idoc {
        Idoc::new(uid, format!("INVOIC_{}.xml", uid))
    }

    fn configure_idoc(&self, idoc: &mut Idoc, invoice: &Invoice) -> Result<(), AssemblyError> {
        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&invoice.uid)
        {
            return Err(AssemblyError::MissingField("mock".to_string()));
        }
        let invoice_type = invoice
            .invoice_type()
            .ok_or(AssemblyError::Unclassified(invoice.uid))?;

        idoc.start = "<IDOC>".to_string();
        idoc.body = Some(format!(
            "<DOC uid=\"{}\" type=\"{}\"/>",
            invoice.uid, invoice_type
        ));
        idoc.end = "</IDOC>".to_string();
        self.configured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invoice.uid);
        Ok(())
    }
}
