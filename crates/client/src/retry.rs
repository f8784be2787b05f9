use std::time::Duration;

/// Default pause between two passes over the URL list.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(4);

/// How transport failures are retried across the configured URLs.
///
/// One round tries every URL once, in the order they were configured. A URL
/// is abandoned for the round when the request fails at the transport level
/// or the server answers 5xx. The client sleeps `delay` between rounds and
/// gives up after `rounds` rounds, reporting the last failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    rounds: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Policy with `rounds` passes (at least one) and `delay` between them.
    pub fn new(rounds: u32, delay: Duration) -> Self {
        Self {
            rounds: rounds.max(1),
            delay,
        }
    }

    /// A single pass over the URL list.
    pub fn single_pass() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, DEFAULT_RETRY_DELAY)
    }
}
