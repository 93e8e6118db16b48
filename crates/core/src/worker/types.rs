//! Types for the pipeline worker.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cursor::Uid;
use crate::invoice::ReferenceError;
use crate::mailbox::MailboxError;
use crate::transfer::TransferError;

/// Pipeline stage a message failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Business/subject criteria not met.
    Filter,
    /// Attachment fetch, analysis call, or normalisation.
    Analysis,
    /// Key/value configuration, reference lookups, classification.
    Enrichment,
    /// IDOC rendering.
    Assembly,
    /// Transfer session, uploads, or source deletion.
    Delivery,
    /// Deleting a `NULL` message.
    Discard,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Filter => "filter",
            Stage::Analysis => "analysis",
            Stage::Enrichment => "enrichment",
            Stage::Assembly => "assembly",
            Stage::Delivery => "delivery",
            Stage::Discard => "discard",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a message was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
}

impl StageFailure {
    pub fn new(stage: Stage, reason: impl fmt::Display) -> Self {
        Self {
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Terminal outcome of one message in one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    Discarded,
    Delivered,
    Flagged(StageFailure),
}

impl MessageOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            MessageOutcome::Discarded => "discarded",
            MessageOutcome::Delivered => "delivered",
            MessageOutcome::Flagged(_) => "flagged",
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, MessageOutcome::Flagged(_))
    }
}

/// Failures inside the delivery sequence.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("source deletion failed: {0}")]
    Mailbox(#[from] MailboxError),
}

/// Failures that abort a whole scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("listing failed: {0}")]
    Listing(#[source] MailboxError),

    #[error("metadata extraction failed: {0}")]
    Metadata(#[source] MailboxError),

    #[error("business criteria unavailable: {0}")]
    Criteria(#[from] ReferenceError),
}

impl ScanError {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            ScanError::Listing(_) | ScanError::Metadata(_) => "listing_failed",
            ScanError::Criteria(_) => "criteria_failed",
        }
    }
}

/// Result of one completed scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Cursor value the scan listed from.
    pub cursor_start: Uid,
    /// Uids returned by the listing.
    pub listed: usize,
    /// Outcomes in processing order.
    pub outcomes: Vec<(Uid, MessageOutcome)>,
}

impl ScanReport {
    pub fn outcome(&self, uid: Uid) -> Option<&MessageOutcome> {
        self.outcomes
            .iter()
            .find(|(u, _)| *u == uid)
            .map(|(_, o)| o)
    }

    pub fn count(&self, label: &str) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.label() == label).count()
    }
}

/// Current status of the worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Whether the background loop is running.
    pub running: bool,
    pub cursor: Uid,
    pub scans_completed: u64,
    pub scans_failed: u64,
    pub delivered: u64,
    pub discarded: u64,
    pub flagged: u64,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
