//! HTTP document analysis backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::invoice::Invoice;

use super::{AnalysisError, AnalyzedField, DocumentAnalyzer, ModelMap, RawResult};

/// Response body of `POST /models/{model}/analyze`.
#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    fields: Vec<AnalyzedField>,
}

/// Analyzer that posts the document to an analysis service over HTTP.
pub struct HttpAnalyzer {
    client: Client,
    config: AnalysisConfig,
}

impl HttpAnalyzer {
    /// Create a new HttpAnalyzer with the given configuration.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| AnalysisError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn build_analyze_url(&self, model_id: &str) -> String {
        format!(
            "{}/models/{}/analyze",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(model_id)
        )
    }
}

#[async_trait]
impl DocumentAnalyzer for HttpAnalyzer {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(
        &self,
        model_map: &ModelMap,
        invoice: &Invoice,
    ) -> Result<RawResult, AnalysisError> {
        let model_id = model_map
            .model_for(&invoice.business)
            .ok_or_else(|| AnalysisError::NoModel(invoice.business.clone()))?;
        let document = invoice
            .attachment
            .as_ref()
            .ok_or(AnalysisError::MissingDocument)?;

        let url = self.build_analyze_url(model_id);
        debug!(uid = invoice.uid, model = model_id, "Posting document for analysis");

        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, document.content_type.as_str())
            .body(document.bytes.clone());
        if !self.config.api_key.is_empty() {
            request = request.header("x-api-key", &self.config.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout
            } else if e.is_connect() {
                AnalysisError::ConnectionFailed(e.to_string())
            } else {
                AnalysisError::ServiceError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::ServiceError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: AnalyzeResponse = response.json().await.map_err(|e| {
            AnalysisError::ServiceError(format!("Failed to parse response: {}", e))
        })?;

        Ok(RawResult {
            model_id: parsed.model_id.unwrap_or_else(|| model_id.to_string()),
            fields: parsed.fields,
        })
    }
}
