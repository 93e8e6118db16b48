use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::worker::WorkerConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub data: DataConfig,
    pub mailbox: MailboxConfig,
    pub analysis: AnalysisConfig,
    pub transfer: TransferConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Locations of the read-only data files: criteria, model map, reference maps
/// and IDOC template segments.
///
/// Each file name is resolved against `root` unless it is absolute.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    #[serde(default = "default_data_root")]
    pub root: PathBuf,
    #[serde(default = "default_criteria")]
    pub criteria: PathBuf,
    #[serde(default = "default_model_map")]
    pub model_map: PathBuf,
    #[serde(default = "default_debtor_map")]
    pub debtor_map: PathBuf,
    #[serde(default = "default_country_map")]
    pub country_map: PathBuf,
    #[serde(default = "default_eu_map")]
    pub eu_map: PathBuf,
    #[serde(default = "default_tax_map")]
    pub tax_map: PathBuf,
    #[serde(default = "default_start_segment")]
    pub start_segment: PathBuf,
    #[serde(default = "default_dynamic_segment")]
    pub dynamic_segment: PathBuf,
    #[serde(default = "default_end_segment")]
    pub end_segment: PathBuf,
}

impl DataConfig {
    /// Create a data config rooted at `root` with the default file names.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Resolve a configured file name against the data root.
    pub fn resolve(&self, file: &std::path::Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: default_data_root(),
            criteria: default_criteria(),
            model_map: default_model_map(),
            debtor_map: default_debtor_map(),
            country_map: default_country_map(),
            eu_map: default_eu_map(),
            tax_map: default_tax_map(),
            start_segment: default_start_segment(),
            dynamic_segment: default_dynamic_segment(),
            end_segment: default_end_segment(),
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("/data")
}

fn default_criteria() -> PathBuf {
    PathBuf::from("business_subject_criteria.json")
}

fn default_model_map() -> PathBuf {
    PathBuf::from("business_models_map.json")
}

fn default_debtor_map() -> PathBuf {
    PathBuf::from("debtor_map.json")
}

fn default_country_map() -> PathBuf {
    PathBuf::from("country_abbreviations_map.json")
}

fn default_eu_map() -> PathBuf {
    PathBuf::from("eu_country_abbreviations_map.json")
}

fn default_tax_map() -> PathBuf {
    PathBuf::from("tax_qualifier_map.json")
}

fn default_start_segment() -> PathBuf {
    PathBuf::from("static_segment_start.xml")
}

fn default_dynamic_segment() -> PathBuf {
    PathBuf::from("dynamic_segment.xml")
}

fn default_end_segment() -> PathBuf {
    PathBuf::from("static_segment_end.xml")
}

/// Mailbox configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailboxConfig {
    pub backend: MailboxBackend,
    /// Spool-specific configuration (required when backend = "spool")
    #[serde(default)]
    pub spool: Option<SpoolConfig>,
}

/// Available mailbox backends
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MailboxBackend {
    Spool,
}

/// Spool directory mailbox: one `<uid>.eml` file per message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpoolConfig {
    pub path: PathBuf,
}

/// Document analysis service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Base URL of the analysis service (e.g., "http://localhost:5050")
    pub endpoint: String,
    /// API key sent as `x-api-key`
    #[serde(default)]
    pub api_key: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// Transfer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    pub backend: TransferBackend,
    /// Directory-specific configuration (required when backend = "directory")
    #[serde(default)]
    pub directory: Option<DirectoryTransferConfig>,
}

/// Available transfer backends
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferBackend {
    Directory,
}

/// Outbox directory receiving IDOCs and PDFs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryTransferConfig {
    pub path: PathBuf,
}

/// Queue mirror configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub backend: MirrorBackend,
    /// Database file (required when backend = "sqlite")
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Available mirror backends
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MirrorBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub data: DataConfig,
    pub mailbox: MailboxConfig,
    pub analysis: SanitizedAnalysisConfig,
    pub transfer: TransferConfig,
    pub mirror: MirrorConfig,
}

/// Sanitized analysis config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAnalysisConfig {
    pub endpoint: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            worker: config.worker.clone(),
            data: config.data.clone(),
            mailbox: config.mailbox.clone(),
            analysis: SanitizedAnalysisConfig {
                endpoint: config.analysis.endpoint.clone(),
                api_key_configured: !config.analysis.api_key.is_empty(),
                timeout_secs: config.analysis.timeout_secs,
            },
            transfer: config.transfer.clone(),
            mirror: config.mirror.clone(),
        }
    }
}
