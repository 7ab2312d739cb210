//! Bounded fixed-delay retry.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Pause between two consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds or attempts run out.
    ///
    /// Every failed attempt is logged at `warn` with its attempt number. The
    /// last error is returned on exhaustion. `op` receives the 1-based attempt.
    pub fn run<T, E: Display>(
        &self,
        what: &str,
        mut op: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, E> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(
                        operation = what,
                        attempt,
                        attempts,
                        error = %err,
                        "attempt failed"
                    );
                    if attempt >= attempts {
                        return Err(err);
                    }
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}
