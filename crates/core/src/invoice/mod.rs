//! The per-message invoice record.
//!
//! An [`Invoice`] is created for each scanned uid. The analysis output goes
//! in through [`Invoice::configure_kv_pairs`], after which
//! [`Invoice::classify`] fixes the type. Every invoice is then enriched with
//! [`Invoice::additional_kv_pairs`] before it is routed, and credit memos get
//! one more pass through [`Invoice::configure_crme`] before assembly.

mod criteria;
mod reference;

pub use criteria::BusinessCriteria;
pub use reference::{ReferenceData, ReferenceError, ReferenceMap};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::{parse_number, KvPairs};
use crate::cursor::Uid;
use crate::mailbox::{Attachment, MessageMetadata};

/// Title words that mark a credit note.
const CREDIT_MARKERS: &[&str] = &["credit", "gutschrift", "avoir"];

/// Document qualifier recorded on credit memos.
const CREDIT_MEMO_QUALIFIER: &str = "CRME";

/// Invoice classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceType {
    /// Not an invoice, or too incomplete to deliver.
    Null,
    /// Standard invoice.
    Invo,
    /// Credit memo.
    Crme,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Null => "NULL",
            InvoiceType::Invo => "INVO",
            InvoiceType::Crme => "CRME",
        }
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors while configuring, enriching or classifying an invoice.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("field {field} is not a valid amount: {value}")]
    InvalidAmount { field: &'static str, value: String },

    #[error("invoice has no vendor tax id or vendor name")]
    MissingVendor,

    #[error("no debtor number for vendor {0}")]
    UnknownDebtor(String),

    #[error("unknown vendor country: {0}")]
    UnknownCountry(String),

    #[error("no tax qualifier for tax rate {0}")]
    UnknownTaxRate(String),

    #[error("invoice is already classified as {0}")]
    AlreadyClassified(InvoiceType),

    #[error("invoice must be classified first")]
    NotClassified,

    #[error("credit memo configuration on a {0} invoice")]
    NotCreditMemo(InvoiceType),

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// Typed invoice fields plus enrichment results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFields {
    pub invoice_id: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_tax_id: Option<String>,
    pub vendor_country: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub currency: Option<String>,
    pub net_amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub tax_rate: Option<String>,
    pub total_amount: Option<f64>,
    pub document_title: Option<String>,

    pub debtor_number: Option<String>,
    pub country_code: Option<String>,
    pub eu_country_code: Option<String>,
    pub tax_qualifier: Option<String>,
    pub document_qualifier: Option<String>,
}

/// Analysis keys accepted for each text field, in priority order.
const TEXT_KEYS: &[(&str, &[&str])] = &[
    ("invoice_id", &["invoice_id", "invoice_number"]),
    ("invoice_date", &["invoice_date"]),
    ("due_date", &["due_date"]),
    ("vendor_name", &["vendor_name"]),
    ("vendor_tax_id", &["vendor_tax_id", "vat_id"]),
    ("vendor_country", &["vendor_country", "vendor_address_country_region"]),
    ("customer_id", &["customer_id"]),
    ("customer_name", &["customer_name"]),
    ("currency", &["currency", "currency_code"]),
    ("tax_rate", &["tax_rate"]),
    ("document_title", &["document_title", "title"]),
];

/// Analysis keys accepted for each amount field, in priority order.
const AMOUNT_KEYS: &[(&str, &[&str])] = &[
    ("net_amount", &["net_amount", "sub_total", "subtotal"]),
    ("tax_amount", &["tax_amount", "total_tax"]),
    ("total_amount", &["total_amount", "invoice_total", "amount_due"]),
];

fn lookup(kv: &KvPairs, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| kv.get(*k))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `19.0` → `19`, `5.5` → `5.5`.
fn format_rate(rate: f64) -> String {
    if rate.fract() == 0.0 {
        format!("{:.0}", rate)
    } else {
        let s = format!("{:.2}", rate);
        s.trim_end_matches('0').to_string()
    }
}

/// Transient record for one message.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub uid: Uid,
    pub subject: String,
    pub business: String,
    pub attachment: Option<Attachment>,
    /// Key/value pairs as extracted by analysis.
    pub kv: KvPairs,
    pub fields: InvoiceFields,
    invoice_type: Option<InvoiceType>,
}

impl Invoice {
    pub fn new(uid: Uid, subject: impl Into<String>, business: impl Into<String>) -> Self {
        Self {
            uid,
            subject: subject.into(),
            business: business.into(),
            attachment: None,
            kv: KvPairs::new(),
            fields: InvoiceFields::default(),
            invoice_type: None,
        }
    }

    pub fn from_metadata(uid: Uid, metadata: &MessageMetadata) -> Self {
        Self::new(uid, metadata.subject.clone(), metadata.business.clone())
    }

    /// The classification, once [`Invoice::classify`] has run.
    pub fn invoice_type(&self) -> Option<InvoiceType> {
        self.invoice_type
    }

    /// Map extracted key/value pairs onto the typed fields.
    pub fn configure_kv_pairs(&mut self, kv: KvPairs) -> Result<(), InvoiceError> {
        if let Some(t) = self.invoice_type {
            return Err(InvoiceError::AlreadyClassified(t));
        }

        let mut fields = InvoiceFields::default();
        for (field, keys) in TEXT_KEYS {
            let value = lookup(&kv, keys);
            match *field {
                "invoice_id" => fields.invoice_id = value,
                "invoice_date" => fields.invoice_date = value,
                "due_date" => fields.due_date = value,
                "vendor_name" => fields.vendor_name = value,
                "vendor_tax_id" => fields.vendor_tax_id = value,
                "vendor_country" => fields.vendor_country = value,
                "customer_id" => fields.customer_id = value,
                "customer_name" => fields.customer_name = value,
                "currency" => fields.currency = value.map(|c| c.to_uppercase()),
                "tax_rate" => fields.tax_rate = value,
                "document_title" => fields.document_title = value,
                _ => {}
            }
        }
        for (field, keys) in AMOUNT_KEYS {
            let Some(raw) = lookup(&kv, keys) else {
                continue;
            };
            let amount = parse_number(&raw).ok_or_else(|| InvoiceError::InvalidAmount {
                field: *field,
                value: raw.clone(),
            })?;
            match *field {
                "net_amount" => fields.net_amount = Some(amount),
                "tax_amount" => fields.tax_amount = Some(amount),
                "total_amount" => fields.total_amount = Some(amount),
                _ => {}
            }
        }

        self.fields = fields;
        self.kv = kv;
        Ok(())
    }

    /// Enrich with reference data lookups.
    ///
    /// The debtor number is required. A vendor country must resolve to a
    /// known code, and a tax rate (stated, or derived from net and tax
    /// amounts) must resolve to a tax qualifier. The EU abbreviation is only
    /// set for EU member states.
    pub fn additional_kv_pairs(&mut self, refs: &ReferenceData) -> Result<(), InvoiceError> {
        let vendor = self
            .fields
            .vendor_tax_id
            .as_deref()
            .or(self.fields.vendor_name.as_deref())
            .ok_or(InvoiceError::MissingVendor)?;
        let debtor = [
            self.fields.vendor_tax_id.as_deref(),
            self.fields.vendor_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find_map(|key| refs.debtors.get(key))
        .ok_or_else(|| InvoiceError::UnknownDebtor(vendor.to_string()))?;
        self.fields.debtor_number = Some(debtor.to_string());

        if let Some(country) = self.fields.vendor_country.clone() {
            let code = match refs.countries.get(&country) {
                Some(code) => code.to_uppercase(),
                None if refs.countries.contains_value(&country) => country.trim().to_uppercase(),
                None => return Err(InvoiceError::UnknownCountry(country)),
            };
            self.fields.eu_country_code = refs.eu_countries.get(&code).map(str::to_string);
            self.fields.country_code = Some(code);
        }

        let rate = match (&self.fields.tax_rate, self.fields.net_amount, self.fields.tax_amount) {
            (Some(rate), _, _) => Some(
                parse_number(rate)
                    .map(format_rate)
                    .unwrap_or_else(|| rate.clone()),
            ),
            (None, Some(net), Some(tax)) if net != 0.0 => {
                Some(format_rate((tax / net * 1000.0).round() / 10.0))
            }
            _ => None,
        };
        if let Some(rate) = rate {
            let qualifier = refs
                .tax_qualifiers
                .get(&rate)
                .ok_or_else(|| InvoiceError::UnknownTaxRate(rate.clone()))?;
            self.fields.tax_qualifier = Some(qualifier.to_string());
            self.fields.tax_rate = Some(rate);
        }

        Ok(())
    }

    /// Set the invoice type. Runs exactly once.
    pub fn classify(&mut self) -> Result<InvoiceType, InvoiceError> {
        if let Some(t) = self.invoice_type {
            return Err(InvoiceError::AlreadyClassified(t));
        }

        let f = &self.fields;
        let invoice_type = match (&f.invoice_id, f.total_amount) {
            (None, _) | (_, None) => InvoiceType::Null,
            (Some(_), Some(total)) if total < 0.0 || self.has_credit_title() => InvoiceType::Crme,
            _ => InvoiceType::Invo,
        };
        self.invoice_type = Some(invoice_type);
        Ok(invoice_type)
    }

    fn has_credit_title(&self) -> bool {
        self.fields
            .document_title
            .as_deref()
            .map(|title| {
                let title = title.to_lowercase();
                CREDIT_MARKERS.iter().any(|m| title.contains(m))
            })
            .unwrap_or(false)
    }

    /// Credit memo adjustments: amounts become absolute and the document
    /// qualifier is recorded.
    pub fn configure_crme(&mut self) -> Result<(), InvoiceError> {
        match self.invoice_type {
            Some(InvoiceType::Crme) => {}
            Some(other) => return Err(InvoiceError::NotCreditMemo(other)),
            None => return Err(InvoiceError::NotClassified),
        }

        let f = &mut self.fields;
        for amount in [&mut f.net_amount, &mut f.tax_amount, &mut f.total_amount] {
            if let Some(v) = amount.as_mut() {
                *v = v.abs();
            }
        }
        f.document_qualifier = Some(CREDIT_MEMO_QUALIFIER.to_string());
        Ok(())
    }

    /// Flat field map used for document assembly.
    ///
    /// Contains every extracted pair, overlaid with the typed and enriched
    /// fields under their canonical names, plus message metadata.
    pub fn template_values(&self) -> BTreeMap<String, String> {
        let mut values: BTreeMap<String, String> = self.kv.clone().into_iter().collect();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                values.insert(key.to_string(), v);
            }
        };

        let f = &self.fields;
        put("uid", Some(self.uid.to_string()));
        put("subject", Some(self.subject.clone()));
        put("business", Some(self.business.clone()));
        put("invoice_type", self.invoice_type.map(|t| t.to_string()));
        put("invoice_id", f.invoice_id.clone());
        put("invoice_date", f.invoice_date.clone());
        put("due_date", f.due_date.clone());
        put("vendor_name", f.vendor_name.clone());
        put("vendor_tax_id", f.vendor_tax_id.clone());
        put("vendor_country", f.vendor_country.clone());
        put("customer_id", f.customer_id.clone());
        put("customer_name", f.customer_name.clone());
        put("currency", f.currency.clone());
        put("net_amount", f.net_amount.map(|v| format!("{:.2}", v)));
        put("tax_amount", f.tax_amount.map(|v| format!("{:.2}", v)));
        put("tax_rate", f.tax_rate.clone());
        put("total_amount", f.total_amount.map(|v| format!("{:.2}", v)));
        put("document_title", f.document_title.clone());
        put("debtor_number", f.debtor_number.clone());
        put("country_code", f.country_code.clone());
        put("eu_country_code", f.eu_country_code.clone());
        put("tax_qualifier", f.tax_qualifier.clone());
        put("document_qualifier", f.document_qualifier.clone());
        put(
            "document_file",
            self.attachment.as_ref().map(|a| a.file_name.clone()),
        );
        values
    }
}
