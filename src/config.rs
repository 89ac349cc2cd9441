// Tunables for a recovery run.

use crate::RecoveryError;

use serde::{Deserialize, Serialize};

use std::time::Duration;

pub const DEFAULT_BLOCK_SIZE: usize = 16;

/// How transient oracle failures are retried before they are escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt of a single query.
    pub max_retries: u32,
    /// Pause between attempts, in milliseconds.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Cipher block size in bytes.
    pub block_size: usize,
    pub retry: RetryPolicy,
    /// Recover independent block pairs on the rayon thread pool.
    pub parallel: bool,
}

impl RecoveryConfig {
    pub fn from_json(json: &str) -> Result<Self, RecoveryError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RecoveryError::malformed(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<(), RecoveryError> {
        check_block_size(self.block_size)
    }
}

/// Padding lengths run up to the block size and are stored in one byte.
pub(crate) fn check_block_size(block_size: usize) -> Result<(), RecoveryError> {
    if block_size == 0 || block_size > u8::MAX as usize {
        return Err(RecoveryError::malformed(format!(
            "block size {block_size} is outside 1..=255"
        )));
    }
    Ok(())
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            retry: RetryPolicy::default(),
            parallel: false,
        }
    }
}
