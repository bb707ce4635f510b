//! Transfer configuration and per-call options.

use std::time::Duration;

use alloy_primitives::U256;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use zgs_primitives::Layout;

use crate::{error::SelectionError, retry::RetryPolicy};

const fn default_expected_replica() -> usize {
    1
}

const fn default_task_size() -> usize {
    10
}

const fn default_concurrency() -> usize {
    8
}

const fn default_timeout_secs() -> u64 {
    3_000
}

const fn default_poll_interval_ms() -> u64 {
    1_000
}

/// Settings shared by the [`Uploader`](crate::Uploader) and
/// [`Downloader`](crate::Downloader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Chunk and segment geometry.
    #[serde(default)]
    pub layout: Layout,

    /// Default replica count for uploads.
    #[serde(default = "default_expected_replica")]
    pub expected_replica: usize,

    /// Default number of segments per upload task.
    #[serde(default = "default_task_size")]
    pub task_size: usize,

    /// Maximum upload tasks or segment fetches in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Bound on a whole upload or download, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transient node failures.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Delay between log entry and finality polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum finality polls, unbounded (up to the timeout) when unset.
    #[serde(default)]
    pub finality_poll_limit: Option<u32>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            layout: Layout::DEFAULT,
            expected_replica: default_expected_replica(),
            task_size: default_task_size(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            retry: RetryPolicy::default(),
            poll_interval_ms: default_poll_interval_ms(),
            finality_poll_limit: None,
        }
    }
}

impl TransferConfig {
    /// Bound on a whole operation.
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay between polls.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Rejects settings no transfer can run with.
    pub fn validate(&self) -> Result<(), SelectionError> {
        if self.concurrency == 0 {
            return Err(SelectionError::configuration("concurrency must be at least one"));
        }
        if self.task_size == 0 {
            return Err(SelectionError::configuration("task size must be at least one"));
        }
        Ok(())
    }
}

/// Options of a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Opaque tags recorded on-chain with the submission.
    pub tags: Bytes,
    /// Distinct nodes that must receive each segment.
    pub expected_replica: usize,
    /// Wait until every replica acknowledges and reports the file finalized.
    pub finality_required: bool,
    /// Segments per upload task.
    pub task_size: usize,
    /// Reuse an existing log entry instead of submitting again.
    pub skip_tx: bool,
    /// Value paid with the submission.
    pub fee: U256,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

impl UploadOptions {
    /// Options carrying the defaults of `config`.
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            tags: Bytes::new(),
            expected_replica: config.expected_replica,
            finality_required: false,
            task_size: config.task_size,
            skip_tx: false,
            fee: U256::ZERO,
        }
    }

    /// Sets the submission tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl Into<Bytes>) -> Self {
        self.tags = tags.into();
        self
    }

    /// Sets the replica count.
    #[must_use]
    pub const fn with_expected_replica(mut self, replica: usize) -> Self {
        self.expected_replica = replica;
        self
    }

    /// Requires finalization on every replica.
    #[must_use]
    pub const fn with_finality_required(mut self, required: bool) -> Self {
        self.finality_required = required;
        self
    }

    /// Sets the task size.
    #[must_use]
    pub const fn with_task_size(mut self, task_size: usize) -> Self {
        self.task_size = task_size;
        self
    }

    /// Reuses an existing log entry when one is found.
    #[must_use]
    pub const fn with_skip_tx(mut self, skip_tx: bool) -> Self {
        self.skip_tx = skip_tx;
        self
    }

    /// Sets the submission fee.
    #[must_use]
    pub const fn with_fee(mut self, fee: U256) -> Self {
        self.fee = fee;
        self
    }
}

/// Options of a single download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Fetch proofs and check every segment against the root.
    pub verify_proof: bool,
}

impl DownloadOptions {
    /// Options that verify every segment.
    pub const fn verified() -> Self {
        Self { verify_proof: true }
    }
}
