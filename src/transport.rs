//! Transport lifecycle.
//!
//! [`Transport`] wraps any [`Broker`] and owns the lifecycle every backend
//! shares:
//!
//! ```text
//! Disconnected --connect()--> Connected --bind()--> Bound
//! ```
//!
//! Publishing, claiming, and consuming require `Bound`. The wrapper checks
//! preconditions, encodes and decodes payloads, and drives consumer
//! dispatch, so a broker only ever sees calls that make sense for its state.
//! There is no explicit disconnect: dropping the transport releases the
//! broker and any claim it still holds.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dispatch::{self, Consumer, ConsumerFn};
use crate::{
    // ---
    BindingName,
    BoxError,
    BrokerPtr,
    ConnectionConfig,
    Delivery,
    Envelope,
    QueueError,
    Result,
};

/// Lifecycle state of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportState {
    /// Initial state; only `connect()` is allowed.
    Disconnected,
    /// Connection config accepted; `bind()` is allowed.
    Connected,
    /// Bound to a binding; every operation is allowed.
    Bound,
}

/// A broker handle with lifecycle enforcement and consumer dispatch.
///
/// A `Transport` is owned by one task at a time. Concurrency comes from
/// running many transports (in one process or many) against the same
/// backend, not from sharing one.
///
/// # Example
///
/// ```no_run
/// use mom_queue::{ConnectionConfig, Transport, BoxError};
/// use serde_json::{json, Value};
///
/// # async fn example() -> mom_queue::Result<()> {
/// let mut transport = Transport::new(mom_queue::create_broker("dropfile")?);
/// transport.connect(ConnectionConfig::new("/var/spool/mq")).await?;
/// transport.bind("jobs").await?;
///
/// transport.publish(&json!({ "i": 1 })).await?;
///
/// transport.set_consumer(|msg: Value| async move {
///     println!("got {msg}");
///     Ok::<(), BoxError>(())
/// })?;
/// transport.consume().await?;
/// # Ok(())
/// # }
/// ```
pub struct Transport {
    broker: BrokerPtr,
    state: TransportState,
    config: Option<ConnectionConfig>,
    binding: Option<BindingName>,
    consumer: Option<Arc<dyn ConsumerFn>>,
}

impl Transport {
    // ---
    /// Wrap a broker. The transport starts `Disconnected`.
    pub fn new(broker: BrokerPtr) -> Self {
        Self {
            broker,
            state: TransportState::Disconnected,
            config: None,
            binding: None,
            consumer: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Backend name of the wrapped broker.
    pub fn broker_kind(&self) -> &'static str {
        self.broker.kind()
    }

    /// Interval a blocking consume sleeps between empty claim attempts.
    pub fn poll_interval(&self) -> Duration {
        self.broker.poll_interval()
    }

    /// Connection config accepted by `connect()`.
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// True once `connect()` has succeeded.
    pub fn is_connected(&self) -> bool {
        self.state >= TransportState::Connected
    }

    /// True once `bind()` has succeeded.
    pub fn is_bound(&self) -> bool {
        self.state == TransportState::Bound
    }

    /// True if bound, and bound to `name`.
    pub fn is_bound_to(&self, name: &str) -> bool {
        self.is_bound() && self.binding.as_ref().is_some_and(|b| b.as_str() == name)
    }

    /// The current binding, if bound.
    pub fn binding(&self) -> Option<&BindingName> {
        self.binding.as_ref()
    }

    /// Validate `config` and hand it to the broker.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Configuration`] if the host is empty, the broker
    ///   refuses it, or the broker cannot use it
    /// - [`QueueError::ProtocolViolation`] if already connected
    pub async fn connect(&mut self, config: ConnectionConfig) -> Result<()> {
        // ---
        if self.is_connected() {
            return Err(QueueError::ProtocolViolation(
                "connect() called on a connected transport".into(),
            ));
        }

        if config.host.trim().is_empty() {
            return Err(QueueError::Configuration("no host found, please set one".into()));
        }

        if self.broker.rejects_host(&config.host) {
            return Err(QueueError::Configuration(format!(
                "host {:?} is not allowed by the {} broker",
                config.host,
                self.broker.kind()
            )));
        }

        self.broker.connect(&config).await?;

        crate::log_info!("{} transport connected to {}", self.broker.kind(), config.host);

        self.config = Some(config);
        self.state = TransportState::Connected;
        Ok(())
    }

    /// Bind to the named queue, creating its storage if needed.
    ///
    /// Binding again to the current name does nothing. Binding to another
    /// name switches queues; a claim still pending on the old binding is
    /// released for redelivery first. A registered consumer stays registered.
    ///
    /// # Errors
    ///
    /// [`QueueError::Configuration`] if the name is invalid or the transport
    /// was never connected.
    pub async fn bind(&mut self, name: impl AsRef<str>) -> Result<()> {
        // ---
        let binding = BindingName::new(name)?;

        if !self.is_connected() {
            return Err(QueueError::Configuration(
                "cannot bind before connect(), no host to bind under".into(),
            ));
        }

        if self.is_bound_to(binding.as_str()) {
            return Ok(());
        }

        if self.broker.release_pending().await? {
            crate::log_warn!("released unacknowledged delivery while rebinding");
        }

        self.broker.bind(&binding).await?;

        crate::log_info!("{} transport bound to {binding}", self.broker.kind());

        self.binding = Some(binding);
        self.state = TransportState::Bound;
        Ok(())
    }

    fn assure_bound(&self, op: &str) -> Result<()> {
        match self.state {
            TransportState::Bound => Ok(()),
            TransportState::Connected => Err(QueueError::ProtocolViolation(format!(
                "cannot {op} because bind() has not been called"
            ))),
            TransportState::Disconnected => Err(QueueError::ProtocolViolation(format!(
                "cannot {op} because there is no active connection"
            ))),
        }
    }

    /// Encode `msg` and durably enqueue it on the current binding.
    pub async fn publish<T>(&self, msg: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        // ---
        self.assure_bound("publish")?;
        let envelope = Envelope::encode(msg)?;
        self.broker.publish(envelope).await
    }

    /// Enqueue an already encoded envelope.
    pub async fn publish_envelope(&self, envelope: Envelope) -> Result<()> {
        // ---
        self.assure_bound("publish")?;
        if envelope.is_empty() {
            return Err(QueueError::ProtocolViolation(
                "refusing to publish an empty envelope".into(),
            ));
        }
        self.broker.publish(envelope).await
    }

    /// Fetch one message without waiting, acknowledging it immediately.
    ///
    /// Returns `Ok(None)` when nothing is claimable. A message that cannot
    /// be decoded as `T` is released for redelivery and the decode error is
    /// returned.
    pub async fn get<T>(&mut self) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        // ---
        let delivery = match self.try_claim().await? {
            Some(delivery) => delivery,
            None => return Ok(None),
        };

        match delivery.envelope.decode::<T>() {
            Ok(msg) => {
                self.broker.ack_success(delivery).await?;
                Ok(Some(msg))
            }
            Err(err) => {
                self.broker.ack_failure(delivery).await?;
                Err(err)
            }
        }
    }

    /// Register the callback that `consume()` dispatches to.
    ///
    /// The callback receives the decoded payload. Returning `Ok` resolves
    /// the message; returning an error requeues it and surfaces the error
    /// from `consume()` as [`QueueError::Callback`].
    ///
    /// # Errors
    ///
    /// [`QueueError::ProtocolViolation`] if called before `bind()`.
    pub fn set_consumer<T, F, Fut, E>(&mut self, callback: F) -> Result<()>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        // ---
        if !self.is_bound() {
            return Err(QueueError::ProtocolViolation(
                "cannot set a consumer before bind() is called".into(),
            ));
        }

        self.consumer = Some(Arc::new(Consumer::new(callback)));
        Ok(())
    }

    /// True if a consumer callback is registered.
    pub fn has_consumer(&self) -> bool {
        self.consumer.is_some()
    }

    /// Make one claim attempt and dispatch the message if one was claimed.
    ///
    /// Returns whether a message was dispatched.
    pub async fn try_consume(&mut self) -> Result<bool> {
        // ---
        self.assure_bound("consume")?;
        let consumer = self.consumer.clone().ok_or_else(|| {
            QueueError::ProtocolViolation(
                "callback is not set, it should be set using set_consumer()".into(),
            )
        })?;

        match self.broker.try_claim().await? {
            Some(delivery) => {
                dispatch::dispatch(self.broker.as_mut(), consumer.as_ref(), delivery).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Wait until one message is claimed and dispatch it.
    ///
    /// Blocks (asynchronously) until a message shows up; there is no
    /// timeout at this layer. A callback error is returned after the message
    /// has been requeued.
    pub async fn consume(&mut self) -> Result<()> {
        // ---
        loop {
            if self.try_consume().await? {
                return Ok(());
            }
            tokio::time::sleep(self.broker.poll_interval()).await;
        }
    }

    /// Make one claim attempt and hand back the raw delivery.
    ///
    /// The delivery must be passed to [`ack_success`](Self::ack_success) or
    /// [`ack_failure`](Self::ack_failure). Claiming again first releases an
    /// unacknowledged delivery for redelivery.
    pub async fn try_claim(&mut self) -> Result<Option<Delivery>> {
        self.assure_bound("claim")?;
        self.broker.try_claim().await
    }

    /// Wait until a message is claimed and hand back the raw delivery.
    pub async fn claim(&mut self) -> Result<Delivery> {
        // ---
        loop {
            if let Some(delivery) = self.try_claim().await? {
                return Ok(delivery);
            }
            tokio::time::sleep(self.broker.poll_interval()).await;
        }
    }

    /// Resolve a claimed delivery so it is never delivered again.
    pub async fn ack_success(&mut self, delivery: Delivery) -> Result<()> {
        self.assure_bound("acknowledge")?;
        self.broker.ack_success(delivery).await
    }

    /// Release a claimed delivery for redelivery.
    pub async fn ack_failure(&mut self, delivery: Delivery) -> Result<()> {
        self.assure_bound("acknowledge")?;
        self.broker.ack_failure(delivery).await
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("broker", &self.broker.kind())
            .field("state", &self.state)
            .field("binding", &self.binding)
            .field("has_consumer", &self.consumer.is_some())
            .finish()
    }
}
