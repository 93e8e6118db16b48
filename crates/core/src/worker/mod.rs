//! The pipeline worker.
//!
//! One background loop drains the mailbox: each scan lists uids at or past
//! the cursor, mirrors their metadata and drives every message, one at a
//! time and in listing order, to a terminal outcome:
//! - **Discarded**: classified `NULL`, deleted from the mailbox
//! - **Delivered**: IDOC and PDF transferred, source deleted
//! - **Flagged**: a stage failed, message left in the mailbox for a human

mod config;
mod runner;
mod types;

pub use config::WorkerConfig;
pub use runner::{InvoiceWorker, WorkerDeps};
pub use types::{
    DeliveryError, MessageOutcome, ScanError, ScanReport, Stage, StageFailure, WorkerStatus,
};
