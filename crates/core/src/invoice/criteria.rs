//! Business subject criteria: which messages are worth analysing at all.

use std::collections::HashMap;
use std::path::Path;

use super::reference::{load_json_map, ReferenceError};
use super::Invoice;

/// Business → subject keywords.
///
/// A message qualifies when its business is listed and its subject contains
/// any of that business's keywords. An empty keyword list accepts every
/// subject from that business. Matching is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct BusinessCriteria(HashMap<String, Vec<String>>);

impl BusinessCriteria {
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        Ok(load_json_map::<Vec<String>>(path)?.into_iter().collect())
    }

    pub fn should_process(&self, invoice: &Invoice) -> bool {
        let Some(keywords) = self.0.get(&invoice.business.to_lowercase()) else {
            return false;
        };
        if keywords.is_empty() {
            return true;
        }
        let subject = invoice.subject.to_lowercase();
        keywords.iter().any(|k| subject.contains(k.as_str()))
    }
}

impl<K, V, S> FromIterator<(K, V)> for BusinessCriteria
where
    K: Into<String>,
    V: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(business, keywords)| {
                    (
                        business.into().to_lowercase(),
                        keywords
                            .into_iter()
                            .map(|k| k.into().to_lowercase())
                            .filter(|k| !k.trim().is_empty())
                            .collect(),
                    )
                })
                .collect(),
        )
    }
}
