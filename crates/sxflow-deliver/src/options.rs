use serde::{Deserialize, Serialize};
use sxflow_remote::RetryPolicy;
use sxflow_resource::DeliveryMode;

use crate::PollPolicy;

/// Pipelines in flight at once when the caller does not say otherwise.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverOptions {
    pub mode:                 DeliveryMode,
    /// Parallel downloads within one sample.
    pub download_concurrency: usize,
    /// Parallel downloads across the whole batch.
    pub max_connections:      usize,
    /// Attempts per artifact before the sample fails.
    pub artifact_attempts:    u32,
    pub retry:                RetryPolicy,
    pub poll:                 PollPolicy,
    /// Report `CompletedWithErrors` as a failure instead of a partial result.
    pub fail_if_incomplete:   bool,
    pub shorten_filenames:    bool,
    /// How often a sample waiting on another process's reservation re-checks.
    pub cache_wait_ms:        u64,
}

impl Default for DeliverOptions {
    fn default() -> Self {
        Self {
            mode:                 DeliveryMode::Download,
            download_concurrency: 4,
            max_connections:      32,
            artifact_attempts:    3,
            retry:                RetryPolicy::default(),
            poll:                 PollPolicy::default(),
            fail_if_incomplete:   false,
            shorten_filenames:    false,
            cache_wait_ms:        1_000,
        }
    }
}
