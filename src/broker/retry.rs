//! Retry policy for deliveries that timed out.
//!
//! A timed-out delivery keeps resending until the bot acknowledges. The
//! policy decides how many resends are allowed (`None` = unbounded) and how
//! long to wait after a resend that failed for any reason other than a
//! timeout. The wait is a fixed interval.

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on resends; `None` retries until acknowledged.
    pub max_attempts: Option<u32>,
    /// Pause after a resend that neither timed out nor was acknowledged.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    /// Unbounded resends with a fixed 20 second backoff.
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(backoff: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    /// Whether resend number `attempt` (0-indexed) may be made.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Delay after the failed resend number `attempt`.
    pub fn delay(&self, _attempt: u32) -> Duration {
        self.backoff
    }
}
