//! Fixed-delay retries for calls made by the conversation loop

use std::time::Duration;

use tracing::warn;

use crate::Config;

/// Try an operation up to `max_retries` times, sleeping `delay` between
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    /// Number of attempts actually made; zero retries still runs once.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Run `op` until it succeeds, returning the last error otherwise.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, mut op: F) -> std::result::Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> std::result::Result<T, E>,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Poll `check` until it returns true, giving up after the last attempt.
    pub fn wait_until<F>(&self, mut check: F) -> bool
    where
        F: FnMut(u32) -> bool,
    {
        let attempts = self.attempts();
        for attempt in 1..=attempts {
            if check(attempt) {
                return true;
            }
            if attempt < attempts {
                std::thread::sleep(self.delay);
            }
        }
        false
    }
}
