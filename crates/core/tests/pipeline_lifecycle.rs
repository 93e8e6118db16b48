//! Pipeline lifecycle integration tests.
//!
//! These tests drive the invoice worker with mock capabilities:
//! - Per-message transitions (delivered, discarded, flagged at each stage)
//! - Mirror cleanup after every terminal outcome
//! - Cursor advance, idempotent re-scans and operator rewinds
//! - Scan-level failures and the background loop

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use invoq_core::{
    analysis::AnalysisError,
    config::DataConfig,
    mailbox::MailboxError,
    testing::{fixtures, MockAnalyzer, MockAssembler, MockMailbox, MockTransfer, TransferStep},
    CursorStore, InMemoryMirror, InvoiceWorker, MessageOutcome, MirrorEntry, QueueMirror,
    ScanError, Stage, StageFailure, WorkerConfig, WorkerDeps,
};

/// Test helper wiring a worker to mocks and a data directory.
struct TestHarness {
    worker: InvoiceWorker,
    cursor: CursorStore,
    mailbox: Arc<MockMailbox>,
    analyzer: Arc<MockAnalyzer>,
    assembler: Arc<MockAssembler>,
    transfer: Arc<MockTransfer>,
    mirror: Arc<InMemoryMirror>,
    data_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(WorkerConfig::default())
    }

    fn with_config(config: WorkerConfig) -> Self {
        let data_dir = TempDir::new().expect("Failed to create data dir");
        fixtures::write_data_dir(data_dir.path());

        let cursor = CursorStore::new(config.initial_cursor);
        let mailbox = Arc::new(MockMailbox::new());
        let analyzer = Arc::new(MockAnalyzer::new());
        let assembler = Arc::new(MockAssembler::new());
        let transfer = Arc::new(MockTransfer::new());
        let mirror = Arc::new(InMemoryMirror::new());

        let deps = WorkerDeps {
            mailbox: mailbox.clone(),
            analyzer: analyzer.clone(),
            assembler: assembler.clone(),
            transfer: transfer.clone(),
            mirror: mirror.clone(),
            data: DataConfig::rooted_at(data_dir.path()),
        };
        let worker = InvoiceWorker::new(config, deps, cursor.clone());

        Self {
            worker,
            cursor,
            mailbox,
            analyzer,
            assembler,
            transfer,
            mirror,
            data_dir,
        }
    }

    /// Seed a deliverable invoice from acme.com.
    async fn add_invoice(&self, uid: u32) {
        self.mailbox
            .add_message(uid, fixtures::metadata("acme.com", &format!("Invoice {}", uid)), true)
            .await;
        self.analyzer.set_result(uid, fixtures::invoice_result()).await;
    }

    async fn mirror_uids(&self) -> Vec<u32> {
        self.mirror
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.uid)
            .collect()
    }
}

fn flagged_at(outcome: Option<&MessageOutcome>, stage: Stage) -> bool {
    matches!(outcome, Some(MessageOutcome::Flagged(StageFailure { stage: s, .. })) if *s == stage)
}

// =============================================================================
// Per-message transitions
// =============================================================================

#[tokio::test]
async fn test_mixed_scan_delivers_filters_and_flags() {
    let h = TestHarness::new();
    h.cursor.set(100).await;

    // 101: meets criteria, resolves INVO
    h.add_invoice(101).await;
    // 102: fails criteria
    h.mailbox
        .add_message(102, fixtures::metadata("acme.com", "Team lunch"), true)
        .await;
    // 103: analysis throws
    h.mailbox
        .add_message(103, fixtures::metadata("acme.com", "Invoice 103"), true)
        .await;
    h.analyzer
        .set_error(103, AnalysisError::ServiceError("boom".to_string()))
        .await;

    let report = h.worker.run_scan().await.unwrap();

    assert_eq!(report.listed, 3);
    assert_eq!(report.outcome(101), Some(&MessageOutcome::Delivered));
    assert!(flagged_at(report.outcome(102), Stage::Filter));
    assert!(flagged_at(report.outcome(103), Stage::Analysis));

    // 101 delivered and gone
    assert!(!h.mailbox.contains(101).await);
    assert_eq!(h.transfer.uploaded_idocs().await, vec![101]);

    // 102 never analyzed, 103 never enriched or assembled
    assert_eq!(h.analyzer.analyzed().await, vec![101, 103]);
    assert_eq!(h.assembler.configured(), vec![101]);

    // Flagged messages stay for a human
    assert!(h.mailbox.contains(102).await);
    assert!(h.mailbox.contains(103).await);
    assert_eq!(h.mailbox.flagged().await, vec![102, 103]);

    assert!(h.mirror_uids().await.is_empty());
    assert_eq!(h.cursor.get().await, 104);
}

#[tokio::test]
async fn test_outcomes_follow_listing_order() {
    let h = TestHarness::new();
    for uid in [9, 3, 6] {
        h.add_invoice(uid).await;
    }

    let report = h.worker.run_scan().await.unwrap();
    let order: Vec<u32> = report.outcomes.iter().map(|(uid, _)| *uid).collect();
    assert_eq!(order, vec![3, 6, 9]);
    assert_eq!(h.transfer.uploaded_idocs().await, vec![3, 6, 9]);
}

#[tokio::test]
async fn test_null_invoice_is_deleted_and_never_delivered() {
    let h = TestHarness::new();
    h.mailbox
        .add_message(10, fixtures::metadata("acme.com", "Invoice?"), true)
        .await;
    h.analyzer.set_result(10, fixtures::null_result()).await;

    let report = h.worker.run_scan().await.unwrap();

    assert_eq!(report.outcome(10), Some(&MessageOutcome::Discarded));
    assert_eq!(h.mailbox.deleted().await, vec![10]);
    assert_eq!(h.transfer.connect_count().await, 0);
    assert!(h.assembler.configured().is_empty());
    assert!(h.mirror_uids().await.is_empty());
}

#[tokio::test]
async fn test_discard_failure_flags_message() {
    let h = TestHarness::new();
    h.mailbox
        .add_message(11, fixtures::metadata("acme.com", "Invoice"), true)
        .await;
    h.analyzer.set_result(11, fixtures::null_result()).await;
    h.mailbox.fail_delete(11).await;

    let report = h.worker.run_scan().await.unwrap();

    assert!(flagged_at(report.outcome(11), Stage::Discard));
    assert_eq!(h.mailbox.flagged().await, vec![11]);
    assert!(h.mirror_uids().await.is_empty());
}

#[tokio::test]
async fn test_null_invoice_with_missing_debtor_map_is_flagged_not_deleted() {
    let h = TestHarness::new();
    std::fs::remove_file(h.data_dir.path().join("debtor_map.json")).unwrap();
    h.mailbox
        .add_message(10, fixtures::metadata("acme.com", "Invoice?"), true)
        .await;
    h.analyzer.set_result(10, fixtures::null_result()).await;

    let report = h.worker.run_scan().await.unwrap();

    assert!(flagged_at(report.outcome(10), Stage::Enrichment));
    assert!(h.mailbox.deleted().await.is_empty());
    assert!(h.mailbox.contains(10).await);
    assert_eq!(h.mailbox.flagged().await, vec![10]);
    assert!(h.mirror_uids().await.is_empty());
}

#[tokio::test]
async fn test_null_invoice_from_unknown_vendor_is_flagged() {
    let h = TestHarness::new();
    let mut result = fixtures::null_result();
    for field in result.fields.iter_mut().filter(|f| f.name == "VendorName") {
        field.content = "Unknown Ltd".to_string();
    }
    h.mailbox
        .add_message(12, fixtures::metadata("acme.com", "Invoice?"), true)
        .await;
    h.analyzer.set_result(12, result).await;

    let report = h.worker.run_scan().await.unwrap();

    assert!(flagged_at(report.outcome(12), Stage::Enrichment));
    assert!(h.mailbox.contains(12).await);
}

#[tokio::test]
async fn test_credit_memo_is_delivered_as_crme() {
    let h = TestHarness::new();
    h.mailbox
        .add_message(20, fixtures::metadata("acme.com", "Invoice correction"), true)
        .await;
    h.analyzer.set_result(20, fixtures::credit_note_result()).await;

    let report = h.worker.run_scan().await.unwrap();

    assert_eq!(report.outcome(20), Some(&MessageOutcome::Delivered));
    let bodies = h.transfer.uploaded_idoc_bodies().await;
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].contains("type=\"CRME\""));
}

#[tokio::test]
async fn test_enrichment_failure_flags_message() {
    let h = TestHarness::new();
    h.add_invoice(30).await;
    std::fs::write(h.data_dir.path().join("debtor_map.json"), "{ not json").unwrap();

    let report = h.worker.run_scan().await.unwrap();

    assert!(flagged_at(report.outcome(30), Stage::Enrichment));
    assert!(h.mailbox.contains(30).await);
    assert_eq!(h.transfer.connect_count().await, 0);
}

#[tokio::test]
async fn test_assembly_failure_flags_message() {
    let h = TestHarness::new();
    h.add_invoice(31).await;
    h.assembler.fail_for(31);

    let report = h.worker.run_scan().await.unwrap();

    assert!(flagged_at(report.outcome(31), Stage::Assembly));
    assert_eq!(h.transfer.connect_count().await, 0);
}

#[tokio::test]
async fn test_delivery_failure_at_each_step_keeps_message() {
    for step in [
        TransferStep::Connect,
        TransferStep::UploadIdoc,
        TransferStep::UploadPdf,
        TransferStep::Disconnect,
    ] {
        let h = TestHarness::new();
        h.add_invoice(40).await;
        h.transfer.fail_on(step).await;

        let report = h.worker.run_scan().await.unwrap();

        assert!(
            flagged_at(report.outcome(40), Stage::Delivery),
            "step {:?} should flag",
            step
        );
        assert!(h.mailbox.contains(40).await, "step {:?} deleted the message", step);
        assert_eq!(h.mailbox.flagged().await, vec![40]);
        assert!(h.mirror_uids().await.is_empty());
        if step != TransferStep::Connect {
            assert_eq!(h.transfer.disconnect_count().await, 1, "step {:?}", step);
        }
    }
}

#[tokio::test]
async fn test_source_deletion_failure_after_upload_flags() {
    let h = TestHarness::new();
    h.add_invoice(41).await;
    h.mailbox.fail_delete(41).await;

    let report = h.worker.run_scan().await.unwrap();

    assert!(flagged_at(report.outcome(41), Stage::Delivery));
    assert_eq!(h.transfer.uploaded_idocs().await, vec![41]);
    assert!(h.mailbox.contains(41).await);
}

// =============================================================================
// Cursor behaviour
// =============================================================================

#[tokio::test]
async fn test_rescan_does_not_relist_consumed_uids() {
    let h = TestHarness::new();
    h.add_invoice(1).await;
    h.mailbox
        .add_message(2, fixtures::metadata("acme.com", "Hello"), true)
        .await;

    h.worker.run_scan().await.unwrap();
    let second = h.worker.run_scan().await.unwrap();

    assert_eq!(second.listed, 0);
    assert!(second.outcomes.is_empty());
    assert_eq!(h.mailbox.list_calls().await, vec![1, 3]);
    assert_eq!(h.transfer.uploaded_idocs().await, vec![1]);
}

#[tokio::test]
async fn test_operator_rewind_replays_flagged_messages() {
    let h = TestHarness::new();
    h.add_invoice(5).await;
    h.transfer.fail_on(TransferStep::UploadIdoc).await;

    let first = h.worker.run_scan().await.unwrap();
    assert!(flagged_at(first.outcome(5), Stage::Delivery));
    assert_eq!(h.cursor.get().await, 6);

    // Fix the outbox, then rewind
    h.transfer.clear_failures().await;
    h.cursor.set(1).await;

    let second = h.worker.run_scan().await.unwrap();
    assert_eq!(second.cursor_start, 1);
    assert_eq!(second.outcome(5), Some(&MessageOutcome::Delivered));
    assert!(!h.mailbox.contains(5).await);
}

#[tokio::test]
async fn test_skip_ahead_ignores_older_messages() {
    let h = TestHarness::new();
    h.add_invoice(7).await;
    h.add_invoice(50).await;
    h.cursor.set(10).await;

    let report = h.worker.run_scan().await.unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcome(50), Some(&MessageOutcome::Delivered));
    assert!(h.mailbox.contains(7).await);
}

// =============================================================================
// Scan-level failures
// =============================================================================

#[tokio::test]
async fn test_listing_failure_aborts_scan_and_leaves_mirror() {
    let h = TestHarness::new();
    h.add_invoice(1).await;
    h.mirror
        .upsert(MirrorEntry {
            uid: 99,
            business: "acme.com".to_string(),
            subject: "left over".to_string(),
        })
        .await
        .unwrap();
    h.mailbox
        .set_next_list_error(MailboxError::Unavailable("imap down".to_string()))
        .await;

    let err = h.worker.run_scan().await.unwrap_err();
    assert!(matches!(err, ScanError::Listing(_)));
    assert!(h.analyzer.analyzed().await.is_empty());
    assert_eq!(h.mirror_uids().await, vec![99]);
    assert_eq!(h.cursor.get().await, 1);

    // Next cycle tries again
    let report = h.worker.run_scan().await.unwrap();
    assert_eq!(report.outcome(1), Some(&MessageOutcome::Delivered));

    let status = h.worker.status().await;
    assert_eq!(status.scans_failed, 1);
    assert_eq!(status.scans_completed, 1);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_missing_criteria_aborts_scan_before_listing() {
    let h = TestHarness::new();
    h.add_invoice(1).await;
    std::fs::remove_file(h.data_dir.path().join("business_subject_criteria.json")).unwrap();

    let err = h.worker.run_scan().await.unwrap_err();
    assert!(matches!(err, ScanError::Criteria(_)));
    assert!(h.mailbox.list_calls().await.is_empty());

    let status = h.worker.status().await;
    assert_eq!(status.scans_failed, 1);
    assert!(status.last_error.unwrap().contains("criteria"));
}

#[tokio::test]
async fn test_missing_model_map_flags_only_current_message() {
    let h = TestHarness::new();
    h.add_invoice(1).await;
    std::fs::remove_file(h.data_dir.path().join("business_models_map.json")).unwrap();

    let report = h.worker.run_scan().await.unwrap();
    assert!(flagged_at(report.outcome(1), Stage::Analysis));
}

// =============================================================================
// Background loop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_loop_scans_then_idles() {
    let h = TestHarness::new();
    h.worker.start().await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.worker.status().await.scans_completed, 1);

    h.add_invoice(1).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.worker.status().await.scans_completed, 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let status = h.worker.status().await;
    assert_eq!(status.scans_completed, 2);
    assert_eq!(status.delivered, 1);
    assert!(status.running);

    h.worker.stop().await;
    assert!(!h.worker.status().await.running);
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_listing_failure() {
    let h = TestHarness::new();
    h.mailbox
        .set_next_list_error(MailboxError::Unavailable("imap down".to_string()))
        .await;
    h.add_invoice(1).await;

    h.worker.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.worker.status().await.scans_failed, 1);
    assert!(h.mailbox.contains(1).await);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let status = h.worker.status().await;
    assert_eq!(status.scans_completed, 1);
    assert_eq!(status.delivered, 1);
    assert_eq!(h.mailbox.list_calls().await.len(), 2);

    h.worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_idle_wait_immediately() {
    let h = TestHarness::new();
    h.worker.start().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let before = tokio::time::Instant::now();
    h.worker.stop().await;
    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(h.mailbox.list_calls().await.len(), 1);
}
