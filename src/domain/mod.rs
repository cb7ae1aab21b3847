//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! any concrete broker backend, storage layout, or client library.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod binding;
mod broker;
mod connection;
mod envelope;

// --- Broker domain re-exports ---

pub use binding::BindingName;
pub use broker::{Broker, BrokerPtr, Delivery, Receipt};
pub use connection::ConnectionConfig;
pub use envelope::Envelope;
