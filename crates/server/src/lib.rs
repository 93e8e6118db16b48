//! Control API and process bootstrap for the invoice ingestion service.

pub mod api;
pub mod metrics;
pub mod state;
