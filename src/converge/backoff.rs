//! Delay schedule between status polls. Delays carry no jitter.

use std::time::Duration;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Delay schedule used by [`super::Convergence`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollBackoff {
    initial: Duration,
    maximum: Duration,
    exponential: bool,
}

impl PollBackoff {
    /// Polls on a fixed interval.
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            maximum: interval,
            exponential: false,
        }
    }

    /// Doubles the delay after every poll, starting at `initial` and capped at
    /// `maximum`.
    #[must_use]
    pub const fn exponential(initial: Duration, maximum: Duration) -> Self {
        Self {
            initial,
            maximum,
            exponential: true,
        }
    }

    /// Delay to wait after poll number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.initial;
        }
        let shift = attempt.saturating_sub(1).min(31);
        self.initial
            .saturating_mul(1_u32 << shift)
            .min(self.maximum.max(self.initial))
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::fixed(DEFAULT_POLL_INTERVAL)
    }
}
