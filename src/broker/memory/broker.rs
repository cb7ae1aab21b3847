// src/broker/memory/broker.rs

use std::collections::{HashMap, VecDeque};
use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::Duration;

use crate::{
    // ---
    BindingName,
    Broker,
    BrokerPtr,
    ConnectionConfig,
    Delivery,
    Envelope,
    QueueError,
    Receipt,
    Result,
};

type QueueKey = (String, BindingName);

/// Process-wide queues, shared by every memory broker.
static QUEUES: LazyLock<Mutex<HashMap<QueueKey, VecDeque<Envelope>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct InFlight {
    receipt: Receipt,
    key: QueueKey,
    envelope: Envelope,
}

/// In-memory broker.
///
/// ## Semantics
///
/// - Publish appends to the binding's queue.
/// - Claims take from the front; nothing else can see a claimed message.
/// - Requeued messages go to the back.
pub struct MemoryBroker {
    host: Option<String>,
    binding: Option<BindingName>,
    poll_interval: Duration,
    in_flight: Option<InFlight>,
    next_receipt: u64,
}

impl MemoryBroker {
    // ---
    /// Default sleep between empty claim attempts.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// Create an unconnected memory broker.
    pub fn new() -> Self {
        Self {
            host: None,
            binding: None,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            in_flight: None,
            next_receipt: 0,
        }
    }

    /// Number of messages waiting (not in flight) on the current binding.
    pub fn pending_len(&self) -> usize {
        match self.key() {
            Ok(key) => lock_ignore_poison(&QUEUES).get(&key).map_or(0, VecDeque::len),
            Err(_) => 0,
        }
    }

    fn key(&self) -> Result<QueueKey> {
        match (&self.host, &self.binding) {
            (Some(host), Some(binding)) => Ok((host.clone(), binding.clone())),
            _ => Err(QueueError::ProtocolViolation(
                "memory broker is not bound".into(),
            )),
        }
    }

    fn take_in_flight(&mut self, delivery: &Delivery) -> Result<InFlight> {
        // ---
        match self.in_flight.take() {
            Some(claim) if claim.receipt == delivery.receipt => Ok(claim),
            other => {
                self.in_flight = other;
                Err(QueueError::ProtocolViolation(format!(
                    "{} does not match the pending claim",
                    delivery.receipt
                )))
            }
        }
    }

    fn requeue(claim: InFlight) {
        lock_ignore_poison(&QUEUES)
            .entry(claim.key)
            .or_default()
            .push_back(claim.envelope);
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryBroker {
    fn drop(&mut self) {
        // Same outcome as a dropfile consumer dying with the lock held.
        if let Some(claim) = self.in_flight.take() {
            Self::requeue(claim);
        }
    }
}

#[async_trait::async_trait]
impl Broker for MemoryBroker {
    // ---
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        // ---
        if let Some(ms) = config.parsed_option::<u64>("poll_interval_ms")? {
            if ms == 0 {
                return Err(QueueError::Configuration(
                    "poll interval must be greater than zero".into(),
                ));
            }
            self.poll_interval = Duration::from_millis(ms);
        }
        self.host = Some(config.host.clone());
        Ok(())
    }

    async fn bind(&mut self, binding: &BindingName) -> Result<()> {
        // ---
        let host = self
            .host
            .clone()
            .ok_or_else(|| QueueError::Configuration("memory broker is not connected".into()))?;

        lock_ignore_poison(&QUEUES)
            .entry((host, binding.clone()))
            .or_default();

        self.binding = Some(binding.clone());
        Ok(())
    }

    async fn publish(&self, envelope: Envelope) -> Result<()> {
        // ---
        let key = self.key()?;
        lock_ignore_poison(&QUEUES)
            .entry(key)
            .or_default()
            .push_back(envelope);
        Ok(())
    }

    async fn try_claim(&mut self) -> Result<Option<Delivery>> {
        // ---
        if self.release_pending().await? {
            crate::log_warn!("previous delivery was never acknowledged, released it for redelivery");
        }

        let key = self.key()?;
        let envelope = match lock_ignore_poison(&QUEUES)
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            Some(envelope) => envelope,
            None => return Ok(None),
        };

        self.next_receipt += 1;
        let receipt = Receipt::new(self.next_receipt);

        self.in_flight = Some(InFlight {
            receipt,
            key,
            envelope: envelope.clone(),
        });
        Ok(Some(Delivery { envelope, receipt }))
    }

    async fn ack_success(&mut self, delivery: Delivery) -> Result<()> {
        self.take_in_flight(&delivery).map(drop)
    }

    async fn ack_failure(&mut self, delivery: Delivery) -> Result<()> {
        // ---
        let claim = self.take_in_flight(&delivery)?;
        Self::requeue(claim);
        Ok(())
    }

    async fn release_pending(&mut self) -> Result<bool> {
        // ---
        match self.in_flight.take() {
            Some(claim) => {
                Self::requeue(claim);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Create a new, unconnected memory broker.
///
/// This broker is always available and requires no external resources.
pub fn create_broker() -> BrokerPtr {
    Box::new(MemoryBroker::new())
}
