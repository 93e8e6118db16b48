//! Testing utilities and mock implementations.
//!
//! Compiled for unit tests and behind the `testing` feature, which dev
//! dependencies enable.
//!
//! Mocks for every capability the worker drives, so the pipeline can be
//! exercised end to end without a mailbox, analysis service or outbox.
//!
//! # Example
//!
//! ```rust,ignore
//! use invoq_core::testing::{fixtures, MockAnalyzer, MockMailbox, MockTransfer};
//!
//! let mailbox = MockMailbox::new();
//! mailbox.add_message(101, fixtures::metadata("acme.com", "Invoice 101"), true).await;
//!
//! let analyzer = MockAnalyzer::new();
//! analyzer.set_result(101, fixtures::invoice_result()).await;
//!
//! let transfer = MockTransfer::new();
//! transfer.fail_on(TransferStep::UploadPdf).await;
//! ```

mod mock_analyzer;
mod mock_assembler;
mod mock_mailbox;
mod mock_transfer;

pub use mock_analyzer::MockAnalyzer;
pub use mock_assembler::MockAssembler;
pub use mock_mailbox::{MockMailbox, MockMessage};
pub use mock_transfer::{MockTransfer, TransferStep};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::analysis::{AnalyzedField, FieldKind, KvPairs, RawResult};
    use crate::mailbox::{Attachment, MessageMetadata};

    /// Minimal PDF payload, base64 encoded.
    const PDF_BASE64: &str = "JVBERi0xLjQK";

    /// An RFC 5322 message, optionally with a PDF attachment named `pdf`.
    pub fn eml(from: &str, subject: &str, pdf: Option<&str>) -> String {
        let headers = format!(
            "From: {}\r\nTo: ap@example.com\r\nSubject: {}\r\n\
             Date: Thu, 01 Feb 2024 10:00:00 +0000\r\n\
             Message-ID: <fixture@example.com>\r\nMIME-Version: 1.0\r\n",
            from, subject
        );
        match pdf {
            Some(name) => format!(
                "{headers}Content-Type: multipart/mixed; boundary=\"invoq-boundary\"\r\n\r\n\
                 --invoq-boundary\r\n\
                 Content-Type: text/plain; charset=utf-8\r\n\r\n\
                 Please find the document attached.\r\n\
                 --invoq-boundary\r\n\
                 Content-Type: application/pdf; name=\"{name}\"\r\n\
                 Content-Disposition: attachment; filename=\"{name}\"\r\n\
                 Content-Transfer-Encoding: base64\r\n\r\n\
                 {PDF_BASE64}\r\n\
                 --invoq-boundary--\r\n"
            ),
            None => format!(
                "{headers}Content-Type: text/plain; charset=utf-8\r\n\r\nHello.\r\n"
            ),
        }
    }

    pub fn metadata(business: &str, subject: &str) -> MessageMetadata {
        MessageMetadata {
            business: business.to_string(),
            subject: subject.to_string(),
        }
    }

    pub fn pdf_attachment(file_name: &str) -> Attachment {
        Attachment {
            file_name: file_name.to_string(),
            content_type: "application/pdf".to_string(),
            bytes: b"%PDF-1.4\n".to_vec(),
        }
    }

    /// Normalised key/value pairs of a standard German invoice.
    pub fn invoice_kv() -> KvPairs {
        [
            ("invoice_id", "INV-2024-001"),
            ("invoice_date", "2024-02-01"),
            ("vendor_name", "Acme Corp"),
            ("vendor_tax_id", "DE123456789"),
            ("vendor_country", "Germany"),
            ("customer_name", "Initech"),
            ("currency_code", "eur"),
            ("sub_total", "1000.00"),
            ("total_tax", "190.00"),
            ("tax_rate", "19.00"),
            ("invoice_total", "1190.00"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Raw analysis output for the invoice in [`invoice_kv`].
    pub fn invoice_result() -> RawResult {
        RawResult {
            model_id: "prebuilt-invoice".to_string(),
            fields: vec![
                AnalyzedField::new("InvoiceId", FieldKind::Text, "INV-2024-001"),
                AnalyzedField::new("InvoiceDate", FieldKind::Date, "01.02.2024"),
                AnalyzedField::new("VendorName", FieldKind::Text, "Acme Corp"),
                AnalyzedField::new("VendorTaxId", FieldKind::Text, "DE123456789"),
                AnalyzedField::new("VendorCountry", FieldKind::Text, "Germany"),
                AnalyzedField::new("CustomerName", FieldKind::Text, "Initech"),
                AnalyzedField::new("CurrencyCode", FieldKind::Text, "EUR"),
                AnalyzedField::new("SubTotal", FieldKind::Number, "1.000,00"),
                AnalyzedField::new("TotalTax", FieldKind::Number, "190,00"),
                AnalyzedField::new("TaxRate", FieldKind::Text, "19%"),
                AnalyzedField::new("InvoiceTotal", FieldKind::Number, "1.190,00"),
            ],
        }
    }

    /// Raw analysis output of a credit note.
    pub fn credit_note_result() -> RawResult {
        let mut result = invoice_result();
        result
            .fields
            .push(AnalyzedField::new("DocumentTitle", FieldKind::Text, "Gutschrift"));
        result
    }

    /// Raw analysis output of a document that is not an invoice.
    pub fn null_result() -> RawResult {
        RawResult {
            model_id: "prebuilt-invoice".to_string(),
            fields: vec![
                AnalyzedField::new("DocumentTitle", FieldKind::Text, "Newsletter"),
                AnalyzedField::new("VendorName", FieldKind::Text, "Acme Corp"),
            ],
        }
    }

    /// Write criteria, model map, reference maps and IDOC segments under
    /// `root` using the default file names.
    pub fn write_data_dir(root: &Path) {
        let files: &[(&str, &str)] = &[
            (
                "business_subject_criteria.json",
                r#"{"acme.com": ["invoice", "rechnung"], "globex.de": []}"#,
            ),
            (
                "business_models_map.json",
                r#"{"acme.com": "prebuilt-invoice", "globex.de": "globex-v1"}"#,
            ),
            (
                "debtor_map.json",
                r#"{"DE123456789": "D-1001", "Acme Corp": "D-1001", "Globex GmbH": "D-2002"}"#,
            ),
            (
                "country_abbreviations_map.json",
                r#"{"Germany": "DE", "Greece": "GR", "Switzerland": "CH"}"#,
            ),
            (
                "eu_country_abbreviations_map.json",
                r#"{"DE": "DE", "GR": "EL"}"#,
            ),
            (
                "tax_qualifier_map.json",
                r#"{"19": "VAT19", "7": "VAT7", "0": "VAT0"}"#,
            ),
            (
                "static_segment_start.xml",
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<INVOIC02>\n",
            ),
            (
                "dynamic_segment.xml",
                "  <E1EDK01 BELNR=\"{{ invoice_id }}\" TYPE=\"{{ invoice_type }}\" \
                 CURCY=\"{{ currency }}\" TOTAL=\"{{ total_amount }}\"/>\n",
            ),
            ("static_segment_end.xml", "</INVOIC02>\n"),
        ];
        for (name, content) in files {
            std::fs::write(root.join(name), content).unwrap();
        }
    }
}
