// src/domain/broker.rs

//! Broker capability interface.
//!
//! A [`Broker`] is one queue backend: it knows how to store envelopes under a
//! binding, hand out exclusive claims on them, and resolve or requeue a claim
//! when it is acknowledged. It knows nothing about lifecycle ordering,
//! payload types, or user callbacks; the [`Transport`](crate::Transport)
//! wrapper enforces those before any broker method is reached.
//!
//! Concrete implementations live under `src/broker/`.

use std::fmt;
use std::time::Duration;

use crate::{BindingName, ConnectionConfig, Envelope, Result};

/// Identifies one claim handed out by a broker.
///
/// Receipts are unique per broker instance. Acknowledging a delivery whose
/// receipt is not the broker's pending claim is a protocol violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Receipt(u64);

impl Receipt {
    // ---
    /// Create a receipt from a broker-issued sequence number.
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The underlying sequence number.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receipt#{}", self.0)
    }
}

/// A claimed message awaiting acknowledgement.
///
/// Returned by [`Broker::try_claim`]. The broker keeps whatever it needs to
/// resolve the claim (an open locked file, an in-flight slot) until the
/// delivery is passed back to [`Broker::ack_success`] or
/// [`Broker::ack_failure`].
#[derive(Debug)]
pub struct Delivery {
    /// The claimed envelope, exactly as published.
    pub envelope: Envelope,
    /// Ties this delivery to the broker's pending claim.
    pub receipt: Receipt,
}

/// Queue backend.
///
/// Implementations must ensure that:
/// - a published envelope is durably visible to claimers once `publish()`
///   returns `Ok`
/// - at most one claim on a given message is outstanding at any time, across
///   every handle and process sharing the backend
/// - `ack_failure()`, or dropping the broker while a claim is pending, leaves
///   the message claimable again with its content intact
/// - `ack_success()` prevents the message from ever being claimed again
///
/// No ordering between distinct messages is promised.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    // ---
    /// Short backend name used in logs and by the broker factory.
    fn kind(&self) -> &'static str;

    /// Returns true if this backend refuses to connect to `host`.
    ///
    /// Default implementation accepts every host.
    fn rejects_host(&self, _host: &str) -> bool {
        false
    }

    /// Interval between claim attempts when a blocking consume finds nothing.
    fn poll_interval(&self) -> Duration;

    /// Validate the config and prepare to bind.
    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()>;

    /// Locate or create the storage for `binding` and make it current.
    async fn bind(&mut self, binding: &BindingName) -> Result<()>;

    /// Durably enqueue an envelope on the current binding.
    async fn publish(&self, envelope: Envelope) -> Result<()>;

    /// Make a single attempt to claim a pending message.
    ///
    /// Returns `Ok(None)` when nothing is claimable right now. Never blocks
    /// waiting for a contended message.
    async fn try_claim(&mut self) -> Result<Option<Delivery>>;

    /// Resolve a claim; the message is never delivered again.
    async fn ack_success(&mut self, delivery: Delivery) -> Result<()>;

    /// Release a claim without resolving it; the message becomes claimable.
    async fn ack_failure(&mut self, delivery: Delivery) -> Result<()>;

    /// Release the pending claim, if any, as if acknowledged with failure.
    ///
    /// Used when the caller lost track of a delivery (dropped it, or is
    /// switching bindings). Returns true if a claim was released.
    async fn release_pending(&mut self) -> Result<bool>;
}

/// Owned, type-erased broker.
pub type BrokerPtr = Box<dyn Broker>;
