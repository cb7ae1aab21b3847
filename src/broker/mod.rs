//! Broker implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Broker` trait. Each backend lives in its own submodule and is exposed
//! through its broker type and a constructor function.
//!
//! Domain code must not depend on backend-specific types.

mod dropfile;
mod memory;

pub use dropfile::{create_broker as create_dropfile_broker, FileQueueBroker, FileQueueConfig};
pub use memory::{create_broker as create_memory_broker, MemoryBroker};
