// src/domain/binding.rs

use std::fmt;
use std::sync::Arc;

use crate::{QueueError, Result};

/// Name of a logical queue.
///
/// A binding name is what a handle publishes to and consumes from. Backends
/// map it onto their own storage (the dropfile broker uses it as a directory
/// name), so it must be a single, non-empty path component.
///
/// Binding names are immutable and cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingName(Arc<str>);

impl BindingName {
    // ---
    /// Validate and create a binding name.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Configuration`] if the name is empty, is `.` or
    /// `..`, or contains a path separator or NUL byte.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        // ---
        let name = name.as_ref();

        if name.is_empty() {
            return Err(QueueError::Configuration("binding name was empty".into()));
        }

        if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
            return Err(QueueError::Configuration(format!(
                "binding name {name:?} must be a single path component"
            )));
        }

        Ok(Self(Arc::from(name)))
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BindingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BindingName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for BindingName {
    type Error = QueueError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for BindingName {
    type Error = QueueError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}
