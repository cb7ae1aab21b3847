//! Typed queue workers.
//!
//! This module provides the glue between a [`Transport`] and application
//! code that owns one kind of message:
//!
//! - [`QueueConsumer`] names a binding and handles its decoded messages
//! - [`Worker`] binds a transport to that binding on first use, registers the
//!   consumer, and offers bounded consume loops on top of single claims
//!
//! ## Bounded loops
//!
//! [`Transport::consume`] waits indefinitely. The loops here are built from
//! single claim attempts instead, so a time bound is honoured even while the
//! queue is empty:
//!
//! - [`Worker::consume_for_count`] dispatches exactly `n` messages
//! - [`Worker::consume_for_time`] dispatches until the deadline passes or an
//!   optional count is reached
//!
//! A handler error stops the loop and is returned; the message it failed on
//! has already been requeued.
//!
//! Implementations should assume:
//! - messages arrive in no particular order
//! - a message may be delivered more than once if a handler fails or a
//!   process dies mid-message

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::{sleep, Instant};

use crate::{BoxError, QueueError, Result, Transport};

/// Application-side handler for one binding.
///
/// # Example
///
/// ```
/// use mom_queue::{BoxError, QueueConsumer};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Resize { image: String, width: u32 }
///
/// struct Thumbnailer;
///
/// #[async_trait::async_trait]
/// impl QueueConsumer for Thumbnailer {
///     type Message = Resize;
///
///     async fn handle(&self, msg: Resize) -> Result<(), BoxError> {
///         println!("resizing {} to {}", msg.image, msg.width);
///         Ok(())
///     }
/// }
///
/// assert_eq!(Thumbnailer.binding(), "thumbnailer");
/// ```
#[async_trait::async_trait]
pub trait QueueConsumer: Send + Sync + 'static {
    /// Payload type carried by this binding.
    type Message: Serialize + DeserializeOwned + Send + 'static;

    /// Binding this consumer reads from and publishes to.
    ///
    /// Defaults to the lower-cased type name, without its module path.
    fn binding(&self) -> String {
        default_binding::<Self>()
    }

    /// Handle one decoded message. Returning an error requeues it.
    async fn handle(&self, msg: Self::Message) -> std::result::Result<(), BoxError>;
}

/// Lower-cased last path segment of `T`'s type name, generics stripped.
fn default_binding<T: ?Sized>() -> String {
    // ---
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_lowercase()
}

/// A transport dedicated to one [`QueueConsumer`].
pub struct Worker<C: QueueConsumer> {
    transport: Transport,
    consumer: Arc<C>,
    registered: bool,
}

impl<C: QueueConsumer> Worker<C> {
    // ---
    /// Pair a connected transport with a consumer.
    ///
    /// The transport is bound lazily, on first publish or consume.
    pub fn new(transport: Transport, consumer: C) -> Self {
        Self {
            transport,
            consumer: Arc::new(consumer),
            registered: false,
        }
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The consumer.
    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    /// Give back the transport.
    pub fn into_transport(self) -> Transport {
        self.transport
    }

    /// Bind to the consumer's binding and register it, unless already done.
    ///
    /// A callback registered on the transport before it was handed over is
    /// replaced by this worker's consumer.
    async fn ready(&mut self) -> Result<&mut Transport> {
        // ---
        if !self.transport.is_connected() {
            return Err(QueueError::Configuration(
                "worker transport has no connection, connect it first".into(),
            ));
        }

        let binding = self.consumer.binding();
        if !self.registered || !self.transport.is_bound_to(&binding) {
            self.transport.bind(&binding).await?;

            let consumer = self.consumer.clone();
            self.transport.set_consumer(move |msg: C::Message| {
                let consumer = consumer.clone();
                async move { consumer.handle(msg).await }
            })?;
            self.registered = true;
        }

        Ok(&mut self.transport)
    }

    /// Publish a message to the consumer's binding.
    pub async fn publish(&mut self, msg: &C::Message) -> Result<()> {
        self.ready().await?.publish(msg).await
    }

    /// Wait for one message and dispatch it.
    pub async fn consume(&mut self) -> Result<()> {
        self.ready().await?.consume().await
    }

    /// Dispatch exactly `count` messages, waiting as long as it takes.
    ///
    /// # Errors
    ///
    /// [`QueueError::Configuration`] if `count` is zero; otherwise the first
    /// handler or broker error.
    pub async fn consume_for_count(&mut self, count: usize) -> Result<usize> {
        // ---
        if count == 0 {
            return Err(QueueError::Configuration(
                "cannot consume without a count greater than zero".into(),
            ));
        }

        let transport = self.ready().await?;
        let mut consumed = 0;
        while consumed < count {
            transport.consume().await?;
            consumed += 1;
        }

        crate::log_debug!("consumed {consumed} messages");
        Ok(consumed)
    }

    /// Dispatch messages until `duration` elapses or `count` messages (when
    /// given) have been handled, whichever comes first.
    ///
    /// Returns how many messages were dispatched.
    ///
    /// # Errors
    ///
    /// [`QueueError::Configuration`] if `duration` is zero or `count` is
    /// `Some(0)`; otherwise the first handler or broker error.
    pub async fn consume_for_time(
        &mut self,
        duration: Duration,
        count: Option<usize>,
    ) -> Result<usize> {
        // ---
        if duration.is_zero() {
            return Err(QueueError::Configuration(
                "cannot consume without a time greater than zero".into(),
            ));
        }
        if count == Some(0) {
            return Err(QueueError::Configuration(
                "a count limit must be greater than zero".into(),
            ));
        }

        let transport = self.ready().await?;
        let poll = transport.poll_interval();
        let deadline = Instant::now() + duration;
        let mut consumed = 0;

        while Instant::now() < deadline {
            if transport.try_consume().await? {
                consumed += 1;
                if count.is_some_and(|limit| consumed >= limit) {
                    break;
                }
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(remaining.min(poll)).await;
        }

        crate::log_debug!("consumed {consumed} messages in at most {duration:?}");
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{ConnectionConfig, MemoryBroker};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct PingHandler {
        seen: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl QueueConsumer for PingHandler {
        type Message = u32;

        async fn handle(&self, _msg: u32) -> std::result::Result<(), BoxError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Generic<T>(std::marker::PhantomData<T>);

    async fn memory_transport(host: &str) -> Transport {
        let mut t = Transport::new(Box::new(MemoryBroker::new()));
        t.connect(ConnectionConfig::new(host)).await.unwrap();
        t
    }

    #[test]
    fn test_default_binding_name() {
        // ---
        assert_eq!(default_binding::<PingHandler>(), "pinghandler");
        assert_eq!(default_binding::<Generic<String>>(), "generic");
    }

    #[tokio::test]
    async fn test_lazily_binds_to_consumer_binding() {
        // ---
        let mut worker = Worker::new(
            memory_transport("worker-lazy").await,
            PingHandler {
                seen: AtomicUsize::new(0),
            },
        );
        assert!(!worker.transport().is_bound());

        worker.publish(&7).await.unwrap();
        assert!(worker.transport().is_bound_to("pinghandler"));

        worker.consume().await.unwrap();
        assert_eq!(worker.consumer().seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replaces_callback_set_before_handover() {
        // ---
        let mut transport = memory_transport("worker-handover").await;
        transport.bind("pinghandler").await.unwrap();
        transport
            .set_consumer(|_: u32| async { Err::<(), BoxError>("stale callback".into()) })
            .unwrap();
        transport.publish(&3u32).await.unwrap();

        let mut worker = Worker::new(
            transport,
            PingHandler {
                seen: AtomicUsize::new(0),
            },
        );
        worker.consume().await.unwrap();

        assert_eq!(worker.consumer().seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconnected_transport_is_rejected() {
        // ---
        let transport = Transport::new(Box::new(MemoryBroker::new()));
        let mut worker = Worker::new(
            transport,
            PingHandler {
                seen: AtomicUsize::new(0),
            },
        );

        assert!(matches!(
            worker.publish(&1).await,
            Err(QueueError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_bounds_are_rejected() {
        // ---
        let mut worker = Worker::new(
            memory_transport("worker-zero").await,
            PingHandler {
                seen: AtomicUsize::new(0),
            },
        );

        assert!(matches!(
            worker.consume_for_count(0).await,
            Err(QueueError::Configuration(_))
        ));
        assert!(matches!(
            worker.consume_for_time(Duration::ZERO, None).await,
            Err(QueueError::Configuration(_))
        ));
        assert!(matches!(
            worker.consume_for_time(Duration::from_secs(1), Some(0)).await,
            Err(QueueError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_consume_for_time_returns_when_idle() {
        // ---
        let mut worker = Worker::new(
            memory_transport("worker-idle").await,
            PingHandler {
                seen: AtomicUsize::new(0),
            },
        );

        let start = std::time::Instant::now();
        let consumed = worker
            .consume_for_time(Duration::from_millis(50), None)
            .await
            .unwrap();

        assert_eq!(consumed, 0);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
