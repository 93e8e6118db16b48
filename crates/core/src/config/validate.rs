use super::{
    types::{Config, MailboxBackend, MirrorBackend, TransferBackend},
    ConfigError,
};

/// Smallest accepted idle wait between scans.
const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker idle wait is not absurdly small
/// - Analysis endpoint is set
/// - Each selected backend has its section
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.worker.poll_interval_ms < MIN_POLL_INTERVAL_MS {
        return Err(ConfigError::ValidationError(format!(
            "worker.poll_interval_ms must be at least {}",
            MIN_POLL_INTERVAL_MS
        )));
    }

    if config.analysis.endpoint.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "analysis.endpoint cannot be empty".to_string(),
        ));
    }

    match config.mailbox.backend {
        MailboxBackend::Spool if config.mailbox.spool.is_none() => {
            return Err(ConfigError::ValidationError(
                "mailbox.backend = \"spool\" requires a [mailbox.spool] section".to_string(),
            ));
        }
        _ => {}
    }

    match config.transfer.backend {
        TransferBackend::Directory if config.transfer.directory.is_none() => {
            return Err(ConfigError::ValidationError(
                "transfer.backend = \"directory\" requires a [transfer.directory] section"
                    .to_string(),
            ));
        }
        _ => {}
    }

    if config.mirror.backend == MirrorBackend::Sqlite && config.mirror.path.is_none() {
        return Err(ConfigError::ValidationError(
            "mirror.backend = \"sqlite\" requires mirror.path".to_string(),
        ));
    }

    Ok(())
}
