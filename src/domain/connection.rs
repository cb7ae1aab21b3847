// src/domain/connection.rs

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::{QueueError, Result};

/// Connection parameters handed to [`Broker::connect`](crate::Broker::connect).
///
/// The meaning of `host` is backend specific: the dropfile broker treats it
/// as the base directory, the memory broker as a namespace. Anything a
/// backend needs beyond host and credentials travels in `options`.
///
/// A `Transport` keeps its copy of the config immutable once `connect()`
/// has succeeded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Host, base path, or namespace, depending on the backend.
    pub host: String,
    /// Optional username.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Backend specific options.
    pub options: BTreeMap<String, String>,
}

impl ConnectionConfig {
    // ---
    /// Create a config for `host` with no credentials and no options.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Set the username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a backend option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Look up a raw option value.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Parse an option into `T`, returning `None` when it is not set.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Configuration`] if the option is set but does
    /// not parse.
    pub fn parsed_option<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.option(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                QueueError::Configuration(format!("option {key}={raw:?} is invalid: {e}"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_builder_methods_fill_fields() {
        // ---
        let config = ConnectionConfig::new("/var/spool/mq")
            .with_username("svc")
            .with_password("secret")
            .with_option("extension", "job");

        assert_eq!(config.host, "/var/spool/mq");
        assert_eq!(config.username.as_deref(), Some("svc"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.option("extension"), Some("job"));
        assert_eq!(config.option("missing"), None);
    }

    #[test]
    fn test_parsed_option() {
        // ---
        let config = ConnectionConfig::new("h")
            .with_option("poll_interval_ms", " 25 ")
            .with_option("delete_attempts", "lots");

        assert_eq!(config.parsed_option::<u64>("poll_interval_ms").unwrap(), Some(25));
        assert_eq!(config.parsed_option::<u64>("absent").unwrap(), None);
        assert!(matches!(
            config.parsed_option::<u32>("delete_attempts"),
            Err(QueueError::Configuration(_))
        ));
    }
}
