//! Consumer dispatch.
//!
//! Wraps a typed user callback so a [`Transport`](crate::Transport) can store
//! it without knowing the payload type, and turns the callback's outcome into
//! an acknowledgement:
//!
//! 1. decode the claimed envelope into the callback's payload type
//! 2. invoke the callback
//! 3. `Ok` acknowledges success, any error acknowledges failure and is
//!    returned to the caller unchanged (boxed in [`QueueError::Callback`])
//!
//! A failed acknowledgement after a callback error is logged; the callback
//! error is what the caller sees.

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;

use crate::{Broker, BoxError, Delivery, Envelope, QueueError, Result};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased message callback.
pub(crate) trait ConsumerFn: Send + Sync {
    fn call(&self, envelope: &Envelope) -> BoxFuture<'static, Result<()>>;
}

/// Typed callback plus the payload type it expects.
pub(crate) struct Consumer<F, T> {
    func: F,
    _phantom: std::marker::PhantomData<fn(T)>,
}

impl<F, T> Consumer<F, T> {
    pub(crate) fn new(func: F) -> Self {
        Self {
            func,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<F, Fut, T, E> ConsumerFn for Consumer<F, T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    T: DeserializeOwned + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn call(&self, envelope: &Envelope) -> BoxFuture<'static, Result<()>> {
        // ---
        let msg: T = match envelope.decode() {
            Ok(msg) => msg,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.func)(msg);

        Box::pin(async move { fut.await.map_err(|e| QueueError::Callback(e.into())) })
    }
}

/// Run `consumer` on a claimed delivery and acknowledge the outcome.
pub(crate) async fn dispatch(
    broker: &mut dyn Broker,
    consumer: &dyn ConsumerFn,
    delivery: Delivery,
) -> Result<()> {
    // ---
    let receipt = delivery.receipt;

    match consumer.call(&delivery.envelope).await {
        Ok(()) => {
            broker.ack_success(delivery).await?;
            crate::log_trace!("{receipt} handled");
            Ok(())
        }
        Err(err) => {
            crate::log_debug!("{receipt} failed ({err}), requeueing");
            if let Err(_ack_err) = broker.ack_failure(delivery).await {
                crate::log_error!("could not requeue {receipt} after handler failure: {_ack_err}");
            }
            Err(err)
        }
    }
}
