//! Bounded fixed-interval polling
//!
//! The signing authority works asynchronously: after approval the caller can
//! only re-read the request until a certificate shows up. Polling is bounded
//! so an authority that never signs cannot hang the invocation.
//!
//! # Example
//!
//! ```ignore
//! use certificator::retry::{poll_until_ready, PollConfig, PollOutcome};
//!
//! let outcome = poll_until_ready(&PollConfig::default(), |_attempt| async {
//!     client.get_signing_request("svc.ns").await.map(|r| r.and_then(certificate_of))
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

/// Default number of fetches before giving up
pub const DEFAULT_POLL_ATTEMPTS: u32 = 5;

/// Default pause between fetches, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default pause between fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);

/// Poll policy: fixed interval, bounded attempts, no backoff
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of checks
    pub max_attempts: u32,
    /// Delay between an unready check and the next one
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollConfig {
    /// Zero-delay policy, for tests
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            interval: Duration::ZERO,
        }
    }

    /// Longest time a poll can spend sleeping
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Result of a bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The check produced a value
    Ready {
        /// The produced value
        value: T,
        /// Checks performed, including the successful one
        attempts: u32,
    },
    /// Every attempt came back unready
    Exhausted {
        /// Checks performed
        attempts: u32,
    },
}

/// Run `check` until it yields `Some`, at most `max_attempts` times.
///
/// `Ok(None)` is the only retryable answer. An `Err` ends the poll
/// immediately and is returned as-is. The check receives the 1-based
/// attempt number.
pub async fn poll_until_ready<F, Fut, T, E>(
    config: &PollConfig,
    mut check: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for attempt in 1..=config.max_attempts {
        if let Some(value) = check(attempt).await? {
            return Ok(PollOutcome::Ready {
                value,
                attempts: attempt,
            });
        }

        if attempt < config.max_attempts && !config.interval.is_zero() {
            tokio::time::sleep(config.interval).await;
        }
    }

    Ok(PollOutcome::Exhausted {
        attempts: config.max_attempts,
    })
}
