//! Retry policy shared by uploads and downloads.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::NodeError;

const fn default_max_attempts() -> u32 {
    3
}

/// How long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// The same delay every time.
    Fixed {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// `step * attempt`.
    Linear {
        /// Step in milliseconds.
        step_ms: u64,
    },
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential {
        /// First delay in milliseconds.
        base_ms: u64,
        /// Upper bound in milliseconds.
        max_ms: u64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear { step_ms: 3_000 }
    }
}

/// Bounded retries with backoff for transient node failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per request, including the first. At least one attempt is
    /// always made.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts.
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

/// A request that kept failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    /// Last failure.
    pub error: NodeError,
    /// Attempts made.
    pub attempts: u32,
}

impl RetryPolicy {
    /// Retries without waiting, for tests and local fakes.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay_ms: 0 },
        }
    }

    /// Delay after the failed attempt number `attempt`, counting from 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let millis = match self.backoff {
            Backoff::Fixed { delay_ms } => delay_ms,
            Backoff::Linear { step_ms } => step_ms.saturating_mul(attempt as u64),
            Backoff::Exponential { base_ms, max_ms } => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                base_ms.saturating_mul(factor).min(max_ms)
            }
        };
        Duration::from_millis(millis)
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// `op` receives the attempt number, counting from 1. Only
    /// [transient](NodeError::is_transient) failures are retried.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, Exhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.delay(attempt);
                    warn!(
                        node = %error.node(),
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient node failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(Exhausted {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}
