//! Number and date normalisation and key/value extraction.

use chrono::NaiveDate;

use super::{AnalysisError, FieldKind, FieldValue, KvPairs, RawResult};

/// Date layouts seen on invoices, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d.%m.%y",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse an amount as printed on an invoice.
///
/// Accepts `1234.56`, `1,234.56`, `1.234,56`, `1 234,56`, `1'234.56`,
/// surrounding currency symbols or codes, and negatives written as `-12`,
/// `12-` or `(12)`. A lone separator followed by exactly three digits is a
/// thousands separator (`1.234` is 1234).
pub fn parse_number(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    let negative = trimmed.starts_with('-')
        || trimmed.ends_with('-')
        || (trimmed.starts_with('(') && trimmed.ends_with(')'));

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) => lone_separator_decimal(&cleaned, '.'),
        (None, Some(_)) => lone_separator_decimal(&cleaned, ','),
        (None, None) => None,
    };

    let mut normalized = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        match c {
            '.' | ',' if Some(c) == decimal => normalized.push('.'),
            '.' | ',' => {}
            digit => normalized.push(digit),
        }
    }

    let value: f64 = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Decide whether a separator that is the only kind present is decimal.
fn lone_separator_decimal(cleaned: &str, sep: char) -> Option<char> {
    if cleaned.matches(sep).count() > 1 {
        return None;
    }
    let after = cleaned.rsplit(sep).next().unwrap_or_default();
    if after.len() == 3 {
        None
    } else {
        Some(sep)
    }
}

/// Parse a date in any of the supported layouts. ISO timestamps are cut to
/// their date part.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            trimmed
                .get(..10)
                .filter(|_| trimmed.as_bytes().get(10) == Some(&b'T'))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        })
}

/// `InvoiceTotal` → `invoice_total`, `Vendor Tax ID` → `vendor_tax_id`.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower_or_digit = true;
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower_or_digit = false;
        }
    }
    out.trim_matches('_').to_string()
}

pub(super) fn parse_numbers(mut raw: RawResult) -> Result<RawResult, AnalysisError> {
    for field in raw
        .fields
        .iter_mut()
        .filter(|f| f.kind == FieldKind::Number && !f.content.trim().is_empty())
    {
        let number = parse_number(&field.content).ok_or_else(|| AnalysisError::InvalidNumber {
            field: field.name.clone(),
            content: field.content.clone(),
        })?;
        field.value = Some(FieldValue::Number(number));
    }
    Ok(raw)
}

pub(super) fn parse_dates(mut raw: RawResult) -> Result<RawResult, AnalysisError> {
    for field in raw
        .fields
        .iter_mut()
        .filter(|f| f.kind == FieldKind::Date && !f.content.trim().is_empty())
    {
        let date = parse_date(&field.content).ok_or_else(|| AnalysisError::InvalidDate {
            field: field.name.clone(),
            content: field.content.clone(),
        })?;
        field.value = Some(FieldValue::Date(date));
    }
    Ok(raw)
}

pub(super) fn extract_kv_pairs(raw: &RawResult) -> Result<KvPairs, AnalysisError> {
    let mut kv = KvPairs::new();
    for field in &raw.fields {
        let content = field.content.trim();
        if content.is_empty() {
            continue;
        }
        let value = match (field.kind, &field.value) {
            (FieldKind::Text, _) => content.to_string(),
            (FieldKind::Number, Some(FieldValue::Number(n))) => format!("{:.2}", n),
            (FieldKind::Date, Some(FieldValue::Date(d))) => d.format("%Y-%m-%d").to_string(),
            _ => return Err(AnalysisError::NotNormalized(field.name.clone())),
        };
        kv.insert(to_snake_case(&field.name), value);
    }
    Ok(kv)
}
