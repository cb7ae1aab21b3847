// src/broker/dropfile/config.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::{ConnectionConfig, QueueError, Result, RetryConfig};

/// Typed settings of a [`FileQueueBroker`](super::FileQueueBroker).
///
/// Derived from a [`ConnectionConfig`] when the broker connects. The host is
/// the base directory; every binding becomes a subdirectory of it.
///
/// | option key               | field                           | default |
/// |--------------------------|---------------------------------|---------|
/// | `extension`              | `extension`                     | `msg`   |
/// | `poll_interval_ms`       | `poll_interval`                 | 1       |
/// | `delete_attempts`        | `delete_retry.max_attempts`     | 10      |
/// | `delete_retry_delay_ms`  | `delete_retry.initial_delay`    | 1       |
#[derive(Clone, Debug, PartialEq)]
pub struct FileQueueConfig {
    /// Directory that holds one subdirectory per binding.
    pub base_path: PathBuf,

    /// Extension of message files. Files without it are never claimed.
    pub extension: String,

    /// Sleep between directory scans while a blocking consume waits.
    pub poll_interval: Duration,

    /// Backoff used when deleting resolved message files.
    pub delete_retry: RetryConfig,
}

impl FileQueueConfig {
    // ---
    /// Extension used when none is configured.
    pub const DEFAULT_EXTENSION: &'static str = "msg";

    /// Default sleep between empty scans.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// Create a config rooted at `base_path` with default settings.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            extension: Self::DEFAULT_EXTENSION.to_string(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            delete_retry: RetryConfig::default(),
        }
    }

    /// Derive the broker config from generic connection parameters.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Configuration`] if the host is empty or an
    /// option is malformed.
    pub fn from_connection(config: &ConnectionConfig) -> Result<Self> {
        // ---
        let host = config.host.trim();
        if host.is_empty() {
            return Err(QueueError::Configuration(
                "dropfile broker needs a base path as host".into(),
            ));
        }

        let mut file_config = Self::new(host);

        if let Some(ext) = config.option("extension") {
            file_config.extension = ext.trim().trim_start_matches('.').to_string();
        }
        if let Some(ms) = config.parsed_option::<u64>("poll_interval_ms")? {
            file_config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = config.parsed_option::<u32>("delete_attempts")? {
            file_config.delete_retry.max_attempts = attempts;
        }
        if let Some(ms) = config.parsed_option::<u64>("delete_retry_delay_ms")? {
            file_config.delete_retry.initial_delay = Duration::from_millis(ms);
        }

        file_config.validate()?;
        Ok(file_config)
    }

    /// Check invariants the broker relies on.
    pub fn validate(&self) -> Result<()> {
        // ---
        let ext = self.extension.as_str();
        if ext.is_empty() || ext.contains(['.', '/', '\\', '\0']) || ext == "tmp" {
            return Err(QueueError::Configuration(format!(
                "message extension {ext:?} is not usable"
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(QueueError::Configuration(
                "poll interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
