//! Document analysis.
//!
//! An analyzer turns an invoice's attachment into a [`RawResult`]: named
//! fields with their raw text. The pipeline then normalises numbers and dates
//! and flattens the result into key/value pairs. Only `analyze` talks to the
//! outside world; the three post-processing steps are shared by every backend.

mod http;
mod normalize;
mod types;

pub use http::HttpAnalyzer;
pub use normalize::{parse_date, parse_number, to_snake_case};
pub use types::{AnalyzedField, FieldKind, FieldValue, KvPairs, ModelMap, RawResult};

use async_trait::async_trait;
use thiserror::Error;

use crate::invoice::Invoice;

/// Errors from analysis and its post-processing.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no analysis model configured for business '{0}'")]
    NoModel(String),

    #[error("invoice has no document to analyze")]
    MissingDocument,

    #[error("model map unreadable: {0}")]
    ModelMap(String),

    #[error("analysis service connection failed: {0}")]
    ConnectionFailed(String),

    #[error("analysis service error: {0}")]
    ServiceError(String),

    #[error("analysis request timed out")]
    Timeout,

    #[error("field '{field}' is not a number: '{content}'")]
    InvalidNumber { field: String, content: String },

    #[error("field '{field}' is not a date: '{content}'")]
    InvalidDate { field: String, content: String },

    #[error("field '{0}' was not normalised before extraction")]
    NotNormalized(String),
}

/// A document analysis backend.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Returns the name of this analyzer implementation.
    fn name(&self) -> &str;

    /// Analyze the invoice's document with the model mapped to its business.
    async fn analyze(
        &self,
        model_map: &ModelMap,
        invoice: &Invoice,
    ) -> Result<RawResult, AnalysisError>;

    /// Parse every number field's content into a [`FieldValue::Number`].
    fn parse_numbers(&self, raw: RawResult) -> Result<RawResult, AnalysisError> {
        normalize::parse_numbers(raw)
    }

    /// Parse every date field's content into a [`FieldValue::Date`].
    fn parse_dates(&self, raw: RawResult) -> Result<RawResult, AnalysisError> {
        normalize::parse_dates(raw)
    }

    /// Flatten a normalised result into snake_case key/value pairs.
    fn extract_kv_pairs(&self, raw: &RawResult) -> Result<KvPairs, AnalysisError> {
        normalize::extract_kv_pairs(raw)
    }
}
