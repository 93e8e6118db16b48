use std::sync::Arc;

use invoq_core::{Config, CursorStore, InvoiceWorker, QueueMirror, SanitizedConfig};

/// Shared application state.
///
/// The control API only ever reaches the cursor and the mirror; the worker
/// handle is kept for status reporting.
pub struct AppState {
    config: Config,
    cursor: CursorStore,
    mirror: Arc<dyn QueueMirror>,
    worker: Option<Arc<InvoiceWorker>>,
}

impl AppState {
    pub fn new(
        config: Config,
        cursor: CursorStore,
        mirror: Arc<dyn QueueMirror>,
        worker: Option<Arc<InvoiceWorker>>,
    ) -> Self {
        Self {
            config,
            cursor,
            mirror,
            worker,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn cursor(&self) -> &CursorStore {
        &self.cursor
    }

    pub fn mirror(&self) -> &dyn QueueMirror {
        self.mirror.as_ref()
    }

    /// The pipeline worker, if enabled.
    pub fn worker(&self) -> Option<&Arc<InvoiceWorker>> {
        self.worker.as_ref()
    }
}
