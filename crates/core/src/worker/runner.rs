//! Pipeline worker implementation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::analysis::{AnalysisError, DocumentAnalyzer, KvPairs, ModelMap};
use crate::config::DataConfig;
use crate::cursor::{CursorSnapshot, CursorStore, Uid};
use crate::idoc::{Idoc, IdocAssembler};
use crate::invoice::{BusinessCriteria, Invoice, InvoiceError, InvoiceType, ReferenceData};
use crate::mailbox::{Mailbox, MessageMetadata};
use crate::metrics;
use crate::mirror::{MirrorEntry, QueueMirror};
use crate::transfer::{Transfer, TransferError, TransferSession};

use super::config::WorkerConfig;
use super::types::{
    DeliveryError, MessageOutcome, ScanError, ScanReport, Stage, StageFailure, WorkerStatus,
};

/// Capabilities the worker drives.
#[derive(Clone)]
pub struct WorkerDeps {
    pub mailbox: Arc<dyn Mailbox>,
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    pub assembler: Arc<dyn IdocAssembler>,
    pub transfer: Arc<dyn Transfer>,
    pub mirror: Arc<dyn QueueMirror>,
    /// Criteria, model map, reference maps and segment locations.
    pub data: DataConfig,
}

#[derive(Debug, Default)]
struct WorkerStats {
    scans_completed: u64,
    scans_failed: u64,
    delivered: u64,
    discarded: u64,
    flagged: u64,
    last_scan_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Everything one scan needs; cloned into the background loop.
#[derive(Clone)]
struct Pipeline {
    deps: WorkerDeps,
    cursor: CursorStore,
    stats: Arc<RwLock<WorkerStats>>,
}

/// The invoice worker - drains the mailbox on a fixed idle interval.
pub struct InvoiceWorker {
    config: WorkerConfig,
    pipeline: Pipeline,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl InvoiceWorker {
    /// Create a new worker sharing `cursor` with the control API.
    pub fn new(config: WorkerConfig, deps: WorkerDeps, cursor: CursorStore) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            pipeline: Pipeline {
                deps,
                cursor,
                stats: Arc::new(RwLock::new(WorkerStats::default())),
            },
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn cursor(&self) -> &CursorStore {
        &self.pipeline.cursor
    }

    /// Start the background loop.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker already running");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            mailbox = self.pipeline.deps.mailbox.name(),
            transfer = self.pipeline.deps.transfer.name(),
            "Starting invoice worker"
        );

        let handle = self.spawn_scan_loop();
        *self.handle.lock().await = Some(handle);
    }

    /// Stop the background loop. A scan in progress runs to completion.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker not running");
            return;
        }

        info!("Stopping invoice worker");
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Worker loop ended abnormally: {}", e);
            }
        }
        info!("Invoice worker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn spawn_scan_loop(&self) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let pipeline = self.pipeline.clone();
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Scan loop started");
            loop {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = pipeline.run_scan().await {
                    error!("Scan failed: {}", e);
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Scan loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Scan loop stopped");
        })
    }

    /// Run one scan now.
    pub async fn run_scan(&self) -> Result<ScanReport, ScanError> {
        self.pipeline.run_scan().await
    }

    /// One `(Invoice, Idoc)` pair per uid that has metadata, in `uids` order.
    pub fn create_invoice_and_idoc<'a>(
        &'a self,
        uids: &'a [Uid],
        metadata: &'a BTreeMap<Uid, MessageMetadata>,
    ) -> impl Iterator<Item = (Invoice, Idoc)> + 'a {
        self.pipeline.create_invoice_and_idoc(uids, metadata)
    }

    /// Drive one message to its terminal outcome. Does no bookkeeping.
    pub async fn process_message(
        &self,
        invoice: Invoice,
        idoc: Idoc,
        criteria: &BusinessCriteria,
    ) -> MessageOutcome {
        self.pipeline.process_message(invoice, idoc, criteria).await
    }

    /// Get current worker status.
    pub async fn status(&self) -> WorkerStatus {
        let stats = self.pipeline.stats.read().await;
        WorkerStatus {
            running: self.is_running(),
            cursor: self.pipeline.cursor.get().await,
            scans_completed: stats.scans_completed,
            scans_failed: stats.scans_failed,
            delivered: stats.delivered,
            discarded: stats.discarded,
            flagged: stats.flagged,
            last_scan_at: stats.last_scan_at,
            last_error: stats.last_error.clone(),
        }
    }
}

impl Pipeline {
    async fn run_scan(&self) -> Result<ScanReport, ScanError> {
        let timer = metrics::SCAN_DURATION.start_timer();
        let result = self.scan().await;
        timer.observe_duration();

        let mut stats = self.stats.write().await;
        stats.last_scan_at = Some(Utc::now());
        match &result {
            Ok(report) => {
                metrics::SCANS_TOTAL.with_label_values(&["ok"]).inc();
                stats.scans_completed += 1;
                stats.last_error = None;
                if report.listed > 0 {
                    info!(
                        listed = report.listed,
                        delivered = report.count("delivered"),
                        discarded = report.count("discarded"),
                        flagged = report.count("flagged"),
                        "Scan complete"
                    );
                }
            }
            Err(e) => {
                metrics::SCANS_TOTAL.with_label_values(&[e.label()]).inc();
                stats.scans_failed += 1;
                stats.last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn scan(&self) -> Result<ScanReport, ScanError> {
        let snapshot = self.cursor.snapshot().await;
        let data = &self.deps.data;
        let criteria = BusinessCriteria::load(&data.resolve(&data.criteria))?;

        let uids = self
            .deps
            .mailbox
            .list_uids(snapshot.value)
            .await
            .map_err(ScanError::Listing)?;
        let mut report = ScanReport {
            cursor_start: snapshot.value,
            listed: uids.len(),
            outcomes: Vec::with_capacity(uids.len()),
        };
        if uids.is_empty() {
            debug!(cursor = snapshot.value, "No new messages");
            return Ok(report);
        }

        let metadata = self
            .deps
            .mailbox
            .extract_minimal_metadata(&uids)
            .await
            .map_err(ScanError::Metadata)?;
        self.mirror_metadata(&metadata).await;

        for (invoice, idoc) in self.create_invoice_and_idoc(&uids, &metadata) {
            let uid = invoice.uid;
            let outcome = self.process_message(invoice, idoc, &criteria).await;
            self.finish(uid, &outcome, &snapshot).await;
            report.outcomes.push((uid, outcome));
        }

        Ok(report)
    }

    async fn mirror_metadata(&self, metadata: &BTreeMap<Uid, MessageMetadata>) {
        for (uid, meta) in metadata {
            let entry = MirrorEntry {
                uid: *uid,
                business: meta.business.clone(),
                subject: meta.subject.clone(),
            };
            if let Err(e) = self.deps.mirror.upsert(entry).await {
                warn!(uid, "Mirror upsert failed: {}", e);
            }
        }
    }

    fn create_invoice_and_idoc<'a>(
        &'a self,
        uids: &'a [Uid],
        metadata: &'a BTreeMap<Uid, MessageMetadata>,
    ) -> impl Iterator<Item = (Invoice, Idoc)> + 'a {
        uids.iter().filter_map(move |uid| {
            let Some(meta) = metadata.get(uid) else {
                debug!(uid, "Message vanished, skipping");
                return None;
            };
            Some((
                Invoice::from_metadata(*uid, meta),
                self.deps.assembler.new_idoc(*uid),
            ))
        })
    }

    async fn process_message(
        &self,
        mut invoice: Invoice,
        mut idoc: Idoc,
        criteria: &BusinessCriteria,
    ) -> MessageOutcome {
        let uid = invoice.uid;
        match self.drive(&mut invoice, &mut idoc, criteria).await {
            Ok(outcome) => {
                info!(uid, outcome = outcome.label(), "Message finished");
                outcome
            }
            Err(failure) => {
                warn!(
                    uid,
                    stage = %failure.stage,
                    reason = %failure.reason,
                    "Message flagged"
                );
                MessageOutcome::Flagged(failure)
            }
        }
    }

    /// The per-message transition table.
    async fn drive(
        &self,
        invoice: &mut Invoice,
        idoc: &mut Idoc,
        criteria: &BusinessCriteria,
    ) -> Result<MessageOutcome, StageFailure> {
        if !criteria.should_process(invoice) {
            return Err(StageFailure::new(
                Stage::Filter,
                format!(
                    "business '{}' with subject '{}' does not meet criteria",
                    invoice.business, invoice.subject
                ),
            ));
        }

        let attachment = self
            .deps
            .mailbox
            .fetch_attachment(invoice.uid)
            .await
            .map_err(|e| StageFailure::new(Stage::Analysis, e))?;
        invoice.attachment = Some(attachment);
        let kv = self
            .analyze(invoice)
            .await
            .map_err(|e| StageFailure::new(Stage::Analysis, e))?;

        let invoice_type = self
            .enrich(invoice, kv)
            .map_err(|e| StageFailure::new(Stage::Enrichment, e))?;
        debug!(uid = invoice.uid, %invoice_type, "Classified");

        match invoice_type {
            InvoiceType::Null => {
                self.deps
                    .mailbox
                    .delete(invoice.uid)
                    .await
                    .map_err(|e| StageFailure::new(Stage::Discard, e))?;
                return Ok(MessageOutcome::Discarded);
            }
            InvoiceType::Crme => invoice
                .configure_crme()
                .map_err(|e| StageFailure::new(Stage::Enrichment, e))?,
            InvoiceType::Invo => {}
        }

        self.deps
            .assembler
            .configure_idoc(idoc, invoice)
            .map_err(|e| StageFailure::new(Stage::Assembly, e))?;

        self.deliver(invoice, idoc)
            .await
            .map_err(|e| StageFailure::new(Stage::Delivery, e))?;
        Ok(MessageOutcome::Delivered)
    }

    async fn analyze(&self, invoice: &Invoice) -> Result<KvPairs, AnalysisError> {
        let data = &self.deps.data;
        let model_map = ModelMap::load(&data.resolve(&data.model_map))?;
        let analyzer = &self.deps.analyzer;

        let raw = analyzer.analyze(&model_map, invoice).await?;
        let raw = analyzer.parse_numbers(raw)?;
        let raw = analyzer.parse_dates(raw)?;
        analyzer.extract_kv_pairs(&raw)
    }

    /// Configure, classify, and look up reference data. Runs for every type,
    /// `NULL` included.
    fn enrich(&self, invoice: &mut Invoice, kv: KvPairs) -> Result<InvoiceType, InvoiceError> {
        invoice.configure_kv_pairs(kv)?;
        let invoice_type = invoice.classify()?;
        let refs = ReferenceData::load(&self.deps.data)?;
        invoice.additional_kv_pairs(&refs)?;
        Ok(invoice_type)
    }

    /// connect → upload IDOC → upload PDF → disconnect → delete source.
    async fn deliver(&self, invoice: &Invoice, idoc: &Idoc) -> Result<(), DeliveryError> {
        let mut session = self.deps.transfer.connect().await?;

        if let Err(e) = upload(session.as_mut(), invoice, idoc).await {
            if let Err(close) = session.disconnect().await {
                debug!(uid = invoice.uid, "Disconnect after failed upload: {}", close);
            }
            return Err(e.into());
        }
        session.disconnect().await?;

        self.deps.mailbox.delete(invoice.uid).await?;
        Ok(())
    }

    /// Terminal bookkeeping: flag, drop the mirror entry, advance the cursor.
    async fn finish(&self, uid: Uid, outcome: &MessageOutcome, snapshot: &CursorSnapshot) {
        if let MessageOutcome::Flagged(failure) = outcome {
            metrics::STAGE_FAILURES_TOTAL
                .with_label_values(&[failure.stage.as_str()])
                .inc();
            if let Err(e) = self.deps.mailbox.flag(uid).await {
                warn!(uid, "Failed to flag message: {}", e);
            }
        }

        if let Err(e) = self.deps.mirror.remove(uid).await {
            warn!(uid, "Mirror removal failed: {}", e);
        }

        if !self.cursor.advance_past(uid, snapshot).await {
            debug!(uid, "Cursor not advanced");
        }

        metrics::MESSAGES_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();
        let mut stats = self.stats.write().await;
        match outcome {
            MessageOutcome::Delivered => stats.delivered += 1,
            MessageOutcome::Discarded => stats.discarded += 1,
            MessageOutcome::Flagged(_) => stats.flagged += 1,
        }
    }
}

async fn upload(
    session: &mut dyn TransferSession,
    invoice: &Invoice,
    idoc: &Idoc,
) -> Result<(), TransferError> {
    session.upload_idoc(idoc).await?;
    session.upload_pdf(invoice).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalyzedField, FieldKind};
    use crate::mirror::InMemoryMirror;
    use crate::testing::{fixtures, MockAnalyzer, MockAssembler, MockMailbox, MockTransfer};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        mailbox: Arc<MockMailbox>,
        analyzer: Arc<MockAnalyzer>,
        transfer: Arc<MockTransfer>,
        worker: InvoiceWorker,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        fixtures::write_data_dir(dir.path());
        let mailbox = Arc::new(MockMailbox::new());
        let analyzer = Arc::new(MockAnalyzer::new());
        let transfer = Arc::new(MockTransfer::new());
        let deps = WorkerDeps {
            mailbox: mailbox.clone(),
            analyzer: analyzer.clone(),
            assembler: Arc::new(MockAssembler::new()),
            transfer: transfer.clone(),
            mirror: Arc::new(InMemoryMirror::new()),
            data: DataConfig::rooted_at(dir.path()),
        };
        let worker = InvoiceWorker::new(WorkerConfig::default(), deps, CursorStore::new(1));
        Harness {
            _dir: dir,
            mailbox,
            analyzer,
            transfer,
            worker,
        }
    }

    fn criteria() -> BusinessCriteria {
        [("acme.com", vec!["invoice"])].into_iter().collect()
    }

    async fn process(h: &Harness, uid: Uid, subject: &str) -> MessageOutcome {
        let invoice = Invoice::new(uid, subject, "acme.com");
        let idoc = Idoc::new(uid, format!("INVOIC_{}.xml", uid));
        h.worker.process_message(invoice, idoc, &criteria()).await
    }

    #[tokio::test]
    async fn test_invoice_is_delivered() {
        let h = harness();
        h.mailbox
            .add_message(1, fixtures::metadata("acme.com", "Invoice 1"), true)
            .await;
        h.analyzer.set_result(1, fixtures::invoice_result()).await;

        assert_eq!(process(&h, 1, "Invoice 1").await, MessageOutcome::Delivered);
        assert_eq!(h.transfer.uploaded_idocs().await, vec![1]);
        assert_eq!(h.transfer.uploaded_pdfs().await, vec![1]);
        assert_eq!(h.transfer.disconnect_count().await, 1);
        assert_eq!(h.mailbox.deleted().await, vec![1]);
    }

    #[tokio::test]
    async fn test_filter_failure_never_analyzes() {
        let h = harness();
        h.mailbox
            .add_message(2, fixtures::metadata("acme.com", "Newsletter"), true)
            .await;

        let outcome = process(&h, 2, "Newsletter").await;
        assert!(matches!(
            outcome,
            MessageOutcome::Flagged(StageFailure { stage: Stage::Filter, .. })
        ));
        assert!(h.analyzer.analyzed().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_attachment_is_analysis_failure() {
        let h = harness();
        h.mailbox
            .add_message(3, fixtures::metadata("acme.com", "Invoice"), false)
            .await;

        let outcome = process(&h, 3, "Invoice").await;
        assert!(matches!(
            outcome,
            MessageOutcome::Flagged(StageFailure { stage: Stage::Analysis, .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_number_is_analysis_failure() {
        let h = harness();
        h.mailbox
            .add_message(4, fixtures::metadata("acme.com", "Invoice"), true)
            .await;
        let mut result = fixtures::invoice_result();
        result
            .fields
            .push(AnalyzedField::new("AmountDue", FieldKind::Number, "n/a"));
        h.analyzer.set_result(4, result).await;

        let outcome = process(&h, 4, "Invoice").await;
        assert!(matches!(
            outcome,
            MessageOutcome::Flagged(StageFailure { stage: Stage::Analysis, .. })
        ));
        assert!(h.transfer.uploaded_idocs().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_debtor_is_enrichment_failure() {
        let h = harness();
        h.mailbox
            .add_message(5, fixtures::metadata("acme.com", "Invoice"), true)
            .await;
        let mut result = fixtures::invoice_result();
        for field in result.fields.iter_mut() {
            if field.name == "VendorTaxId" {
                field.content = "XX000".to_string();
            }
            if field.name == "VendorName" {
                field.content = "Nobody Ltd".to_string();
            }
        }
        h.analyzer.set_result(5, result).await;

        let outcome = process(&h, 5, "Invoice").await;
        assert!(matches!(
            outcome,
            MessageOutcome::Flagged(StageFailure { stage: Stage::Enrichment, .. })
        ));
        assert!(h.mailbox.deleted().await.is_empty());
    }

    #[tokio::test]
    async fn test_null_is_discarded_without_delivery() {
        let h = harness();
        h.mailbox
            .add_message(6, fixtures::metadata("acme.com", "Invoice"), true)
            .await;
        h.analyzer.set_result(6, fixtures::null_result()).await;

        assert_eq!(process(&h, 6, "Invoice").await, MessageOutcome::Discarded);
        assert_eq!(h.mailbox.deleted().await, vec![6]);
        assert_eq!(h.transfer.connect_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_upload_still_disconnects_and_keeps_message() {
        let h = harness();
        h.mailbox
            .add_message(7, fixtures::metadata("acme.com", "Invoice"), true)
            .await;
        h.analyzer.set_result(7, fixtures::invoice_result()).await;
        h.transfer
            .fail_on(crate::testing::TransferStep::UploadPdf)
            .await;

        let outcome = process(&h, 7, "Invoice").await;
        assert!(matches!(
            outcome,
            MessageOutcome::Flagged(StageFailure { stage: Stage::Delivery, .. })
        ));
        assert_eq!(h.transfer.disconnect_count().await, 1);
        assert!(h.mailbox.deleted().await.is_empty());
        assert!(h.mailbox.contains(7).await);
    }

    #[tokio::test]
    async fn test_status_counts_scans() {
        let h = harness();
        h.mailbox
            .add_message(1, fixtures::metadata("acme.com", "Invoice"), true)
            .await;
        h.analyzer.set_result(1, fixtures::invoice_result()).await;

        let report = h.worker.run_scan().await.unwrap();
        assert_eq!(report.outcome(1), Some(&MessageOutcome::Delivered));

        let status = h.worker.status().await;
        assert!(!status.running);
        assert_eq!(status.scans_completed, 1);
        assert_eq!(status.delivered, 1);
        assert_eq!(status.cursor, 2);
        assert!(status.last_scan_at.is_some());
    }

    #[tokio::test]
    async fn test_double_start_and_stop_are_noops() {
        let h = harness();
        h.worker.stop().await;
        assert!(!h.worker.is_running());

        h.worker.start().await;
        h.worker.start().await;
        assert!(h.worker.is_running());

        h.worker.stop().await;
        assert!(!h.worker.is_running());
        h.worker.stop().await;
    }
}
