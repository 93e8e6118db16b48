//! Types shared by analysis backends.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::AnalysisError;

/// Normalised key/value pairs extracted from a document.
pub type KvPairs = BTreeMap<String, String>;

/// How a field's content should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Date,
}

/// A parsed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

/// One field as returned by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedField {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    /// Raw text as read from the document.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Set by normalisation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

impl AnalyzedField {
    pub fn new(name: impl Into<String>, kind: FieldKind, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            content: content.into(),
            confidence: None,
            value: None,
        }
    }
}

/// Result of analysing one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub model_id: String,
    pub fields: Vec<AnalyzedField>,
}

/// Business → analysis model id.
#[derive(Debug, Clone, Default)]
pub struct ModelMap(HashMap<String, String>);

impl ModelMap {
    /// Load the model map from a JSON object file.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::ModelMap(format!("{}: {}", path.display(), e)))?;
        let map: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| AnalysisError::ModelMap(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_iter(map))
    }

    /// Model id for `business`, matched case-insensitively.
    pub fn model_for(&self, business: &str) -> Option<&str> {
        self.0
            .get(&business.to_ascii_lowercase())
            .map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ModelMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into()))
                .collect(),
        )
    }
}
