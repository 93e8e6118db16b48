//! Mock document analyzer for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::analysis::{AnalysisError, DocumentAnalyzer, ModelMap, RawResult};
use crate::cursor::Uid;
use crate::invoice::Invoice;

/// Mock implementation of the DocumentAnalyzer trait.
///
/// Returns a canned [`RawResult`] per uid. Normalisation and extraction are
/// the trait's provided methods, so they run for real.
#[derive(Debug, Default)]
pub struct MockAnalyzer {
    results: Arc<RwLock<HashMap<Uid, RawResult>>>,
    /// One-shot errors per uid.
    errors: Arc<RwLock<HashMap<Uid, AnalysisError>>>,
    /// `(uid, model)` for every analyze call.
    analyzed: Arc<RwLock<Vec<(Uid, Option<String>)>>>,
}

impl MockAnalyzer {
    /// Create a new mock analyzer with no canned results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Result returned for `uid`.
    pub async fn set_result(&self, uid: Uid, result: RawResult) {
        self.results.write().await.insert(uid, result);
    }

    /// Make the next analysis of `uid` fail with `error`.
    pub async fn set_error(&self, uid: Uid, error: AnalysisError) {
        self.errors.write().await.insert(uid, error);
    }

    /// Uids analyzed so far, in call order.
    pub async fn analyzed(&self) -> Vec<Uid> {
        self.analyzed.read().await.iter().map(|(uid, _)| *uid).collect()
    }

    /// Model resolved for each call.
    pub async fn models_used(&self) -> Vec<Option<String>> {
        self.analyzed
            .read()
            .await
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentAnalyzer for MockAnalyzer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn analyze(
        &self,
        model_map: &ModelMap,
        invoice: &Invoice,
    ) -> Result<RawResult, AnalysisError> {
        let model = model_map.model_for(&invoice.business).map(str::to_string);
        self.analyzed.write().await.push((invoice.uid, model));

        if let Some(error) = self.errors.write().await.remove(&invoice.uid) {
            return Err(error);
        }
        if invoice.attachment.is_none() {
            return Err(AnalysisError::MissingDocument);
        }
        self.results
            .read()
            .await
            .get(&invoice.uid)
            .cloned()
            .ok_or_else(|| AnalysisError::ServiceError(format!("no result for {}", invoice.uid)))
    }
}
