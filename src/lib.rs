//! Message queues over a shared directory, with a pluggable broker layer.
//!
//! This library provides a small, ergonomic API for point-to-point work
//! queues. Producers publish serializable messages to a named binding;
//! consumers claim them one at a time, run a callback, and acknowledge the
//! outcome. Failed or abandoned messages are redelivered.
//!
//! The default backend, `dropfile`, needs nothing but a directory that every
//! participant can reach. An in-process `memory` backend shares the same
//! semantics for tests.
//!
//! ```no_run
//! use mom_queue::{BoxError, TransportBuilder};
//! use serde_json::Value;
//!
//! # async fn example() -> mom_queue::Result<()> {
//! let mut transport = TransportBuilder::new()
//!     .host("/var/spool/mq")
//!     .bind("emails")
//!     .build()
//!     .await?;
//!
//! transport.publish(&serde_json::json!({ "to": "ops@example.com" })).await?;
//!
//! transport.set_consumer(|msg: Value| async move {
//!     println!("sending {msg}");
//!     Ok::<(), BoxError>(())
//! })?;
//! transport.consume().await?;
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod broker;
mod dispatch;
mod domain;
mod macros;
mod retry;
mod transport;
mod transport_builder;
mod worker;

mod error;

#[allow(unused_imports)]
pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};
pub(crate) use retry::retry_with_backoff;

// Re-export main types
pub use transport::{Transport, TransportState};
pub use transport_builder::TransportBuilder;
pub use worker::{QueueConsumer, Worker};

pub use error::{BoxError, QueueError, Result};
pub use retry::RetryConfig;

pub use broker::{
    // ---
    create_dropfile_broker,
    create_memory_broker,
    FileQueueBroker,
    FileQueueConfig,
    MemoryBroker,
};

// --- public re-exports
pub use domain::{
    //
    BindingName,
    Broker,
    BrokerPtr,
    ConnectionConfig,
    Delivery,
    Envelope,
    Receipt,
};

/// Broker kinds accepted by [`create_broker`].
pub const BROKER_KINDS: &[&str] = &["dropfile", "memory"];

/// Create an unconnected broker by backend name.
///
/// # Errors
///
/// [`QueueError::Configuration`] if `kind` is not one of [`BROKER_KINDS`].
pub fn create_broker(kind: &str) -> Result<BrokerPtr> {
    // ---
    match kind {
        "dropfile" => Ok(create_dropfile_broker()),
        "memory" => Ok(create_memory_broker()),
        other => Err(QueueError::Configuration(format!(
            "unknown broker {other:?}, valid values are: {}",
            BROKER_KINDS.join(", ")
        ))),
    }
}
