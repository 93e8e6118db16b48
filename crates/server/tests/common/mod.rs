//! Common test utilities for in-process API testing.
//!
//! Builds the router around an in-memory mirror, a cursor store and,
//! optionally, a worker wired to mock capabilities.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use invoq_core::{
    config::DataConfig,
    load_config_from_str,
    testing::{MockAnalyzer, MockAssembler, MockMailbox, MockTransfer},
    Config, CursorStore, InMemoryMirror, InvoiceWorker, WorkerDeps,
};
use invoq_server::state::AppState;

/// Re-export fixtures for test convenience
pub use invoq_core::testing::fixtures;

/// Minimal configuration accepted by the loader.
pub const TEST_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[mailbox]
backend = "spool"
[mailbox.spool]
path = "/tmp/invoq-spool"

[analysis]
endpoint = "http://analysis.local:5050"
api_key = "super-secret"

[transfer]
backend = "directory"
[transfer.directory]
path = "/tmp/invoq-outbox"
"#;

/// In-process router plus handles on the shared state behind it.
pub struct TestFixture {
    pub router: Router,
    pub cursor: CursorStore,
    pub mirror: Arc<InMemoryMirror>,
    pub worker: Option<Arc<InvoiceWorker>>,
    pub mailbox: Arc<MockMailbox>,
    pub analyzer: Arc<MockAnalyzer>,
    pub data_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Fixture without a worker.
    pub async fn new() -> Self {
        Self::build(false)
    }

    /// Fixture with a (not started) worker over mock capabilities.
    pub async fn with_worker() -> Self {
        Self::build(true)
    }

    fn build(with_worker: bool) -> Self {
        let config: Config = load_config_from_str(TEST_CONFIG).expect("test config parses");
        let data_dir = TempDir::new().expect("Failed to create data dir");
        fixtures::write_data_dir(data_dir.path());

        let cursor = CursorStore::new(config.worker.initial_cursor);
        let mirror = Arc::new(InMemoryMirror::new());
        let mailbox = Arc::new(MockMailbox::new());
        let analyzer = Arc::new(MockAnalyzer::new());

        let worker = with_worker.then(|| {
            let deps = WorkerDeps {
                mailbox: mailbox.clone(),
                analyzer: analyzer.clone(),
                assembler: Arc::new(MockAssembler::new()),
                transfer: Arc::new(MockTransfer::new()),
                mirror: mirror.clone(),
                data: DataConfig::rooted_at(data_dir.path()),
            };
            Arc::new(InvoiceWorker::new(
                config.worker.clone(),
                deps,
                cursor.clone(),
            ))
        });

        let state = Arc::new(AppState::new(
            config,
            cursor.clone(),
            mirror.clone(),
            worker.clone(),
        ));
        let router = invoq_server::api::create_router(state);

        Self {
            router,
            cursor,
            mirror,
            worker,
            mailbox,
            analyzer,
            data_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        let bytes = serde_json::to_vec(&body).unwrap();
        self.request("POST", path, Some(bytes), Some("application/json"))
            .await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request(
            "POST",
            path,
            Some(body.as_bytes().to_vec()),
            Some("application/json"),
        )
        .await
    }

    /// Send a POST request without a content type.
    pub async fn post_untyped(&self, path: &str, body: &str) -> TestResponse {
        self.request("POST", path, Some(body.as_bytes().to_vec()), None)
            .await
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Vec<u8>>,
        content_type: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(ct) = content_type {
            builder = builder.header("Content-Type", ct);
        }
        let request = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
