pub mod analysis;
pub mod config;
pub mod cursor;
pub mod idoc;
pub mod invoice;
pub mod mailbox;
pub mod metrics;
pub mod mirror;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transfer;
pub mod worker;

pub use analysis::{AnalysisError, DocumentAnalyzer, HttpAnalyzer, KvPairs, ModelMap, RawResult};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use cursor::{CursorSnapshot, CursorStore, Uid};
pub use idoc::{AssemblyError, Idoc, IdocAssembler, IdocTemplate, TemplateAssembler};
pub use invoice::{
    BusinessCriteria, Invoice, InvoiceError, InvoiceType, ReferenceData, ReferenceError,
};
pub use mailbox::{create_mailbox, Attachment, Mailbox, MailboxError, MessageMetadata, SpoolMailbox};
pub use mirror::{create_mirror, InMemoryMirror, MirrorEntry, MirrorError, QueueMirror, SqliteMirror};
pub use transfer::{create_transfer, DirectoryTransfer, Transfer, TransferError, TransferSession};
pub use worker::{
    InvoiceWorker, MessageOutcome, ScanError, ScanReport, Stage, StageFailure, WorkerConfig,
    WorkerDeps, WorkerStatus,
};
