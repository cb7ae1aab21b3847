//! Retry configuration and exponential backoff logic.
//!
//! This module provides the [`RetryConfig`] type and the [`retry_with_backoff`]
//! helper. The dropfile broker uses them to delete resolved message files,
//! which can fail transiently while another process still has the file open.
//!
//! # Retry Strategy
//!
//! - Only retries errors the caller classifies as retryable
//! - Uses exponential backoff with randomized jitter so competing processes
//!   do not retry in lockstep
//! - Caps delay at `max_delay` to prevent excessive wait times
//! - Logs each retry attempt with timing information for debugging

use std::collections::hash_map::RandomState;
use std::fmt::Display;
use std::future::Future;
use std::hash::BuildHasher;
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration with exponential backoff.
///
/// # Example
///
/// ```
/// use mom_queue::RetryConfig;
/// use std::time::Duration;
///
/// let retry_config = RetryConfig {
///     max_attempts: 5,
///     multiplier: 2.0,
///     initial_delay: Duration::from_millis(1),
///     max_delay: Duration::from_millis(50),
/// };
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt).
    pub max_attempts: u32,

    /// Backoff multiplier applied to the delay after each retry.
    ///
    /// Example: 2.0 doubles the delay each time (exponential backoff).
    pub multiplier: f32,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retry attempts (caps exponential growth).
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    /// Defaults tuned for short-lived filesystem contention.
    ///
    /// - `max_attempts`: 10
    /// - `multiplier`: 2.0 (exponential backoff)
    /// - `initial_delay`: 1ms
    /// - `max_delay`: 100ms
    fn default() -> Self {
        // ---
        Self {
            max_attempts: 10,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(100),
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Executes `operation` and retries it while it fails with an error for
/// which `is_retryable` returns true, up to `max_attempts` retries. Errors
/// that are not retryable are returned immediately. Once attempts are
/// exhausted the last error is returned.
///
/// # Backoff Algorithm
///
/// - First retry: `initial_delay` (with jitter)
/// - Subsequent retries: `min(current_delay * multiplier, max_delay)` (with jitter)
/// - Jitter: ±25% randomization
pub(crate) async fn retry_with_backoff<F, Fut, T, E, R>(
    retry_config: &RetryConfig,
    is_retryable: R,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut current_delay = retry_config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if is_retryable(&err) => {
                attempt += 1;

                if attempt > retry_config.max_attempts {
                    crate::log_debug!(
                        "retry exhausted after {} attempts, last error: {}",
                        retry_config.max_attempts,
                        err
                    );
                    return Err(err);
                }

                let jittered_delay = apply_jitter(current_delay);

                crate::log_trace!(
                    "retry attempt {}/{}, waiting {:?} before retry (error: {})",
                    attempt,
                    retry_config.max_attempts,
                    jittered_delay,
                    err
                );

                sleep(jittered_delay).await;

                let next_delay = Duration::from_secs_f64(
                    current_delay.as_secs_f64() * retry_config.multiplier as f64,
                );
                current_delay = next_delay.min(retry_config.max_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Apply ±25% jitter to a duration.
///
/// Uses a simple multiplicative jitter: `delay * (0.75 + random(0.0..0.5))`
fn apply_jitter(delay: Duration) -> Duration {
    // ---
    let random_state = RandomState::new();
    let hash = random_state.hash_one(std::time::SystemTime::now());

    let random_factor = (hash % 1000) as f64 / 1000.0;
    let jitter_multiplier = 0.75 + (random_factor * 0.5);

    Duration::from_secs_f64(delay.as_secs_f64() * jitter_multiplier)
}
