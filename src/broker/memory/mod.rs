// src/broker/memory/mod.rs

//! In-memory broker implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Broker` trait. It is intended for tests, local execution, and as a
//! reference for broker semantics that needs no filesystem.
//!
//! ## Reference Semantics
//!
//! Queues live in a process-wide registry keyed by host and binding, so two
//! handles connected to the same host see the same queues, exactly as two
//! dropfile handles sharing a base directory would.
//!
//! - A claim removes the message from its queue and holds it in flight.
//! - `ack_failure()`, or dropping the broker with a claim in flight, puts the
//!   message back at the end of its queue.
//! - `ack_success()` discards it.
//!
//! ## Non-Goals
//!
//! Persistence, cross-process sharing, and failure simulation.

mod broker;

pub use broker::{create_broker, MemoryBroker};
