//! Retry and skip handling for transient machine failures
//!
//! A run that fails because the machine was busy or went away says nothing
//! about the network under test. [`RetryPolicy::run_safe`] retries such runs a
//! bounded number of times; [`skip_on_transient`] turns a final transient
//! failure into an [`Outcome::Skipped`] the caller can report instead of failing.

use crate::error::*;
use log::{info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Set when running under continuous integration; enables retries
pub const CI_ENV: &str = "CONTINUOUS_INTEGRATION";

/// Seed override for integration runs
pub const SEED_ENV: &str = "P8_INTEGRATION_SEED";

/// Tries allowed under continuous integration
pub const CI_MAX_TRIES: u32 = 3;

/// Result of a run that may have been skipped
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The run finished
    Completed(T),
    /// The run hit a transient failure and was not judged
    Skipped {
        /// What went wrong
        reason: String,
    },
}

impl<T> Outcome<T> {
    /// True when the run was skipped
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped { .. })
    }

    /// The completed value, if any
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Skipped { .. } => None,
        }
    }
}

/// Convert a transient failure into a skip; other errors pass through
pub fn skip_on_transient<T>(result: Result<T>) -> Result<Outcome<T>> {
    match result {
        Ok(value) => Ok(Outcome::Completed(value)),
        Err(RuntimeError::Transient(failure)) => {
            warn!("Skipping: {}", failure);
            Ok(Outcome::Skipped {
                reason: failure.to_string(),
            })
        }
        Err(e) => Err(e),
    }
}

/// Seed from `P8_INTEGRATION_SEED`, if set and numeric
pub fn integration_seed<F>(lookup: F) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(SEED_ENV)?;
    match raw.trim().parse() {
        Ok(seed) => Some(seed),
        Err(_) => {
            warn!("Ignoring non-numeric {}={:?}", SEED_ENV, raw);
            None
        }
    }
}

/// Bounded retry of transient failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts before giving up, at least one
    pub max_tries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// File each failure is appended to
    pub error_log: Option<PathBuf>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 1,
            retry_delay: Duration::ZERO,
            error_log: None,
        }
    }
}

impl RetryPolicy {
    /// Policy from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Policy from an environment lookup: three tries under CI, one otherwise
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_tries = if lookup(CI_ENV).is_some() { CI_MAX_TRIES } else { 1 };
        Self {
            max_tries,
            ..Default::default()
        }
    }

    /// Set the number of tries
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    /// Set the pause between tries
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Append failures to this file
    pub fn with_error_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log = Some(path.into());
        self
    }

    /// Run `operation`, retrying transient failures up to `max_tries` times
    ///
    /// Non-transient errors return immediately. After the last try the final
    /// transient error is returned.
    pub fn run_safe<F, T>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_tries = self.max_tries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation() {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    self.log_failure(label, attempt, &e);
                    if attempt >= max_tries {
                        warn!("{} failed after {} attempts, giving up", label, attempt);
                        return Err(e);
                    }
                    warn!("{} failed (attempt {}): {}, retrying", label, attempt, e);
                    if !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn log_failure(&self, label: &str, attempt: u32, error: &RuntimeError) {
        let Some(path) = &self.error_log else {
            return;
        };
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}\tattempt {}\t{}", label, attempt, error));
        if let Err(e) = written {
            warn!("Could not append to {}: {}", path.display(), e);
        }
    }
}
