// src/broker/dropfile/mod.rs

//! Dropfile broker.
//!
//! A message broker built on nothing but a shared directory. Producers drop
//! uniquely named files into `<base>/<binding>/`; consumers race for them
//! with non-blocking exclusive locks. No server process is involved, and a
//! consumer that crashes mid-message loses its lock to the OS, which makes
//! the message claimable again.
//!
//! ## Guarantees
//!
//! - At-least-once delivery: a message is only gone after a successful
//!   acknowledgement truncated it.
//! - Mutual exclusion: at most one consumer holds a message at a time.
//! - No ordering: directory enumeration order decides which pending message
//!   a scan claims first.
//!
//! ## Non-Goals
//!
//! - Ordering, priorities, or retry counters
//! - Coordination across hosts beyond what the shared filesystem's advisory
//!   locks provide

mod broker;
mod config;
mod naming;
mod storage;

pub use broker::{create_broker, FileQueueBroker};
pub use config::FileQueueConfig;
