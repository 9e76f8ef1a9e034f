//! Retry policies for the provisioning loops.
//!
//! Every loop that waits on something remote (connectivity, checksum
//! agreement, archive-tool availability) asks a `RetryPolicy` whether another
//! attempt is allowed and how long to wait before it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed,
    /// Delay after failure `n` is `n × delay`.
    Linear,
}

/// Bounds and pacing for one retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
    /// Base delay in milliseconds.
    pub delay_ms: u64,
}

impl RetryPolicy {
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff: Backoff::Fixed,
            delay_ms: duration_ms(delay),
        }
    }

    #[must_use]
    pub fn linear(unit: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff: Backoff::Linear,
            delay_ms: duration_ms(unit),
        }
    }

    /// Retry immediately, forever. Used by tests and the transfer loop.
    #[must_use]
    pub fn immediate() -> Self {
        Self::fixed(Duration::ZERO)
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Whether attempt number `attempt` (1-based) may run.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }

    /// Delay to wait after `failures` failed attempts (1-based).
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let base = Duration::from_millis(self.delay_ms);
        match self.backoff {
            Backoff::Fixed => base,
            Backoff::Linear => base.saturating_mul(failures.max(1)),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
