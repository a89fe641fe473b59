//! Retry classification and backoff arithmetic for failed batch items.
//!
//! The policy only decides; the orchestrator owns the actual sleep between
//! attempts. Unknown error codes are never retried.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on `max_retries`.
pub const MAX_RETRIES_CEILING: u32 = 10;

/// Lower bound on the base delay.
pub const MIN_BASE_DELAY_MS: u64 = 100;

/// Upper bound on the base delay.
pub const MAX_BASE_DELAY_MS: u64 = 60_000;

/// Hard cap on any computed backoff delay, regardless of attempt count.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Error codes retried by default: optimistic-version conflicts and
/// transient store outages.
pub const DEFAULT_RETRYABLE_CODES: &[&str] = &["version_conflict", "timeout", "unavailable"];

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Per-batch retry configuration. Serialized to JSONB when a submission
/// overrides the engine default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts per item (0 disables retries).
    pub max_retries: u32,
    /// Base delay before the first retry, doubled on each attempt.
    pub base_delay_ms: u64,
    /// Explicit allow-list of retryable error codes.
    pub retryable_codes: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            retryable_codes: DEFAULT_RETRYABLE_CODES
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Validate configured bounds.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_retries > MAX_RETRIES_CEILING {
            return Err(CoreError::Validation(format!(
                "max_retries {} exceeds ceiling of {MAX_RETRIES_CEILING}",
                self.max_retries
            )));
        }
        if self.base_delay_ms < MIN_BASE_DELAY_MS {
            return Err(CoreError::Validation(format!(
                "base_delay_ms {} is below minimum of {MIN_BASE_DELAY_MS}",
                self.base_delay_ms
            )));
        }
        if self.base_delay_ms > MAX_BASE_DELAY_MS {
            return Err(CoreError::Validation(format!(
                "base_delay_ms {} exceeds maximum of {MAX_BASE_DELAY_MS}",
                self.base_delay_ms
            )));
        }
        Ok(())
    }

    /// True iff the classified error code is in the allow-list. Unknown
    /// codes are never retried.
    pub fn should_retry(&self, error_code: &str) -> bool {
        self.retryable_codes.iter().any(|c| c == error_code)
    }

    /// True iff another attempt is permitted after `attempt` retries.
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Exponential backoff: `base_delay * 2^attempt`, capped at
    /// [`MAX_RETRY_DELAY`] for any attempt magnitude.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.base_delay_ms);
        let factor = match 1u32.checked_shl(attempt) {
            Some(f) => f,
            None => return MAX_RETRY_DELAY,
        };
        base.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
