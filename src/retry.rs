//! Bounded fixed-interval retries.
//!
//! The Git connection poller, the long-running operation poller, the
//! Lakehouse SQL-endpoint wait, item lookups and connection creation all share
//! [`RetryPolicy`] and [`poll`] instead of hand-written loops.

use std::thread;
use std::time::Duration;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum attempts and the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Waiting for a Git connection to leave `NotConnected`.
    pub const fn git_connection() -> Self {
        Self::new(5, DEFAULT_INTERVAL)
    }

    /// Waiting for a long-running operation.
    pub const fn operation() -> Self {
        Self::new(5, DEFAULT_INTERVAL)
    }

    /// Waiting for a Lakehouse SQL endpoint, 60 seconds in total.
    pub const fn sql_endpoint_provisioning() -> Self {
        Self::new(30, DEFAULT_INTERVAL)
    }

    pub const fn connection_create() -> Self {
        Self::new(3, DEFAULT_INTERVAL)
    }

    /// An item lookup retried `retries` times after the first attempt.
    pub const fn item_lookup(retries: u32) -> Self {
        Self::new(retries + 1, DEFAULT_INTERVAL)
    }

    /// The same attempt budget without sleeping.
    pub const fn immediate(self) -> Self {
        Self::new(self.max_attempts, Duration::ZERO)
    }

    /// Total time spent sleeping when every attempt is used.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    /// Terminal success.
    Ready(T),
    /// Not there yet; try again after the interval.
    Pending,
    /// Terminal failure; stop without further attempts.
    Abort,
}

/// Run `probe` until it is ready, aborts, or the attempts are used up.
///
/// The probe receives the 1-based attempt number. Sleeps happen only between
/// attempts, never after the last one.
pub fn poll<T, F>(policy: RetryPolicy, mut probe: F) -> Option<T>
where
    F: FnMut(u32) -> Poll<T>,
{
    for attempt in 1..=policy.max_attempts {
        match probe(attempt) {
            Poll::Ready(value) => return Some(value),
            Poll::Abort => return None,
            Poll::Pending => {
                if attempt < policy.max_attempts && !policy.interval.is_zero() {
                    thread::sleep(policy.interval);
                }
            }
        }
    }
    None
}

/// Timings used by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub git_connection: RetryPolicy,
    pub operation: RetryPolicy,
    pub sql_endpoint_provisioning: RetryPolicy,
    pub connection_create: RetryPolicy,
    pub lookup_interval: Duration,
}

impl Timings {
    /// Same attempt counts, no sleeping.
    pub fn immediate() -> Self {
        let defaults = Self::default();
        Self {
            git_connection: defaults.git_connection.immediate(),
            operation: defaults.operation.immediate(),
            sql_endpoint_provisioning: defaults.sql_endpoint_provisioning.immediate(),
            connection_create: defaults.connection_create.immediate(),
            lookup_interval: Duration::ZERO,
        }
    }

    pub fn item_lookup(&self, retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries + 1, self.lookup_interval)
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            git_connection: RetryPolicy::git_connection(),
            operation: RetryPolicy::operation(),
            sql_endpoint_provisioning: RetryPolicy::sql_endpoint_provisioning(),
            connection_create: RetryPolicy::connection_create(),
            lookup_interval: DEFAULT_INTERVAL,
        }
    }
}
