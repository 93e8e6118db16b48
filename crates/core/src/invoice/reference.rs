//! Static reference data used during enrichment.
//!
//! Four JSON object files map identifiers to codes: debtor numbers, country
//! abbreviations, EU country abbreviations and tax qualifiers. They are read
//! fresh for every message, so a broken file only fails the messages that
//! need it and a fixed file takes effect without a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::DataConfig;

/// Errors reading a data file.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("data file {path} unreadable: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("data file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Read a JSON object file.
pub(crate) fn load_json_map<V: DeserializeOwned>(
    path: &Path,
) -> Result<HashMap<String, V>, ReferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ReferenceError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ReferenceError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// A case-insensitive string lookup table.
#[derive(Debug, Clone, Default)]
pub struct ReferenceMap(HashMap<String, String>);

impl ReferenceMap {
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        Ok(load_json_map::<String>(path)?.into_iter().collect())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(&key.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Whether `value` appears as a mapped value.
    pub fn contains_value(&self, value: &str) -> bool {
        self.0.values().any(|v| v.eq_ignore_ascii_case(value.trim()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ReferenceMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into().trim().to_lowercase(), v.into()))
                .collect(),
        )
    }
}

/// The four enrichment tables.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    /// Vendor tax id or name → debtor number
    pub debtors: ReferenceMap,
    /// Country name → ISO 3166 alpha-2 code
    pub countries: ReferenceMap,
    /// ISO code → EU VAT abbreviation (EU members only)
    pub eu_countries: ReferenceMap,
    /// Tax rate → tax qualifier
    pub tax_qualifiers: ReferenceMap,
}

impl ReferenceData {
    /// Load all four tables from the configured data directory.
    pub fn load(data: &DataConfig) -> Result<Self, ReferenceError> {
        Ok(Self {
            debtors: ReferenceMap::load(&data.resolve(&data.debtor_map))?,
            countries: ReferenceMap::load(&data.resolve(&data.country_map))?,
            eu_countries: ReferenceMap::load(&data.resolve(&data.eu_map))?,
            tax_qualifiers: ReferenceMap::load(&data.resolve(&data.tax_map))?,
        })
    }
}
