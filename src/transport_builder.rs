//! Transport builder for creating connected transport instances.
//!
//! Provides a fluent builder API that picks a broker backend, connects it,
//! and optionally binds it, with clear separation between required and
//! optional configuration.

use std::collections::BTreeMap;

use crate::{ConnectionConfig, QueueError, Result, Transport};

/// Builder for connected [`Transport`]s.
///
/// # Examples
///
/// ## Dropfile queue, bound and ready
/// ```no_run
/// use mom_queue::TransportBuilder;
///
/// # async fn example() -> mom_queue::Result<()> {
/// let transport = TransportBuilder::new()
///     .broker("dropfile")
///     .host("/var/spool/mq")
///     .option("extension", "job")
///     .bind("thumbnails")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## In-memory queue for tests
/// ```
/// use mom_queue::TransportBuilder;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> mom_queue::Result<()> {
/// let transport = TransportBuilder::new()
///     .broker("memory")
///     .host("unit-tests")
///     .build()
///     .await?;
///
/// assert!(transport.is_connected());
/// assert!(!transport.is_bound());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct TransportBuilder {
    broker: Option<String>,
    host: Option<String>,
    username: Option<String>,
    password: Option<String>,
    options: BTreeMap<String, String>,
    binding: Option<String>,
}

impl TransportBuilder {
    // ---
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the broker backend.
    ///
    /// Valid values: `"dropfile"`, `"memory"`. Defaults to `"dropfile"`.
    pub fn broker(mut self, kind: impl Into<String>) -> Self {
        self.broker = Some(kind.into());
        self
    }

    /// Set the host (required).
    ///
    /// For the dropfile broker this is the base directory.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a backend specific option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Bind to `name` as part of `build()`.
    pub fn bind(mut self, name: impl Into<String>) -> Self {
        self.binding = Some(name.into());
        self
    }

    /// Build the transport (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `host` is missing
    /// - the broker kind is not recognized
    /// - connecting or binding fails
    pub async fn build(self) -> Result<Transport> {
        // ---
        let host = self
            .host
            .ok_or_else(|| QueueError::Configuration("no host found, please set one".into()))?;

        let kind = self.broker.as_deref().unwrap_or("dropfile");
        let broker = crate::create_broker(kind)?;

        let config = ConnectionConfig {
            host,
            username: self.username,
            password: self.password,
            options: self.options,
        };

        let mut transport = Transport::new(broker);
        transport.connect(config).await?;

        if let Some(name) = self.binding {
            transport.bind(name).await?;
        }

        Ok(transport)
    }
}
