use thiserror::Error;

/// Boxed error returned by user-supplied message handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    /// A required connection or binding field is missing or invalid
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operation invoked in a lifecycle state that does not allow it
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Filesystem failure that is not a benign race between processes
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The registered message handler failed; the message was requeued
    #[error("message handler failed: {0}")]
    Callback(#[source] BoxError),

    /// Payload could not be serialized into an envelope
    #[error("envelope encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Envelope content could not be turned back into a payload
    #[error("envelope decode error: {0}")]
    Decode(String),
}

impl QueueError {
    // ---
    /// Wrap an I/O error with a short description of what was being done.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        QueueError::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns the handler's original error if this is a callback failure.
    pub fn callback_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            QueueError::Callback(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;
