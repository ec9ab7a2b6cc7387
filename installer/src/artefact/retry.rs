//! Bounded exponential backoff for transient download failures.

use super::download::{CancelFlag, DownloadError};
use log::warn;
use std::time::{Duration, Instant};

/// Granularity of the cancellation check while sleeping between attempts.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Configuration for retry behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_attempts` times without sleeping.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// The delay after the `failed`-th failed attempt (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use tap_installer::artefact::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_after(1), Duration::from_millis(500));
    /// assert_eq!(policy.delay_after(2), Duration::from_secs(1));
    /// assert_eq!(policy.delay_after(20), Duration::from_secs(10));
    /// ```
    #[must_use]
    pub fn delay_after(&self, failed: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(failed.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only [transient](DownloadError::is_transient) errors are retried. The
    /// `cancel` flag is honoured before every attempt and while sleeping.
    ///
    /// # Errors
    ///
    /// Returns the first permanent error, [`DownloadError::Cancelled`], or
    /// [`DownloadError::GaveUp`] wrapping the last transient error.
    pub fn run<T, F>(
        &self,
        url: &str,
        cancel: &CancelFlag,
        mut operation: F,
    ) -> Result<T, DownloadError>
    where
        F: FnMut(u32) -> Result<T, DownloadError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(cancelled(url));
            }
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= attempts => {
                    return Err(DownloadError::GaveUp {
                        url: url.to_owned(),
                        attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        target: "download",
                        "attempt {attempt}/{attempts} failed: {err}; retrying in {delay:?}"
                    );
                    sleep_unless_cancelled(delay, cancel);
                }
            }
        }
    }
}

fn cancelled(url: &str) -> DownloadError {
    DownloadError::Cancelled {
        url: url.to_owned(),
    }
}

fn sleep_unless_cancelled(delay: Duration, cancel: &CancelFlag) {
    let deadline = Instant::now() + delay;
    while !cancel.is_cancelled() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(CANCEL_POLL));
    }
}
