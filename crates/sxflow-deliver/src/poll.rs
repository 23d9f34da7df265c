//! Driving a transform to a terminal phase.
//!
//! Transitions are observed only by polling. The interval grows while the
//! transform is running and the whole wait is bounded by an optional budget.
//! Running out of budget leaves the remote transform untouched.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sxflow_remote::{ControlPlane, RemoteError, RetryPolicy, TransformPhase, TransformStatus, retry};
use tokio::time::Instant;

use crate::DeliveryError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub initial_interval_ms: u64,
    pub max_interval_ms:     u64,
    /// Growth factor applied after each poll that finds the transform running.
    pub multiplier:          f64,
    /// Total time to wait for a terminal phase. `None` waits forever.
    pub timeout_ms:          Option<u64>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 2_000,
            max_interval_ms:     30_000,
            multiplier:          1.5,
            timeout_ms:          None,
        }
    }
}

impl PollPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn initial_interval(&self) -> Duration { Duration::from_millis(self.initial_interval_ms) }

    pub fn timeout(&self) -> Option<Duration> { self.timeout_ms.map(Duration::from_millis) }

    pub fn next_interval(&self, current: Duration) -> Duration {
        let max = Duration::from_millis(self.max_interval_ms);
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        current.mul_f64(multiplier).min(max)
    }
}

/// Poll `transform_id` until it reaches a terminal phase.
///
/// Each status call is retried under `retry_policy`. A transform the control
/// plane no longer knows is reported as failed.
pub async fn poll_to_terminal<C: ControlPlane>(
    control: &C,
    transform_id: &str,
    policy: &PollPolicy,
    retry_policy: &RetryPolicy,
) -> Result<TransformStatus, DeliveryError> {
    let started = Instant::now();
    let deadline = policy.timeout().map(|t| started + t);
    let mut interval = policy.initial_interval();
    let mut last_phase: Option<TransformPhase> = None;

    let timed_out = |now: Instant| {
        tracing::warn!(transform_id, "Polling budget exhausted, leaving transform running");
        DeliveryError::PollingTimedOut {
            transform_id: transform_id.to_string(),
            waited:       now - started,
        }
    };

    loop {
        let attempt = retry(retry_policy, "status", || control.status(transform_id));
        // Retries of a failing status call count against the budget too.
        let outcome = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, attempt)
                .await
                .map_err(|_| timed_out(Instant::now()))?,
            None => attempt.await,
        };
        let status = outcome.map_err(|e| match e {
            RemoteError::NotFound(_) => DeliveryError::TransformFailed {
                transform_id: transform_id.to_string(),
                summary:      "transform is unknown to the control plane".into(),
            },
            other => DeliveryError::from_control(other),
        })?;

        if last_phase != Some(status.phase) {
            tracing::info!(
                transform_id,
                phase = %status.phase,
                files_completed = status.files_completed,
                files_total = ?status.files_total,
                "Transform phase changed"
            );
            last_phase = Some(status.phase);
        }
        if status.phase.is_terminal() {
            return Ok(status);
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(timed_out(now));
                }
                interval.min(deadline - now)
            }
            None => interval,
        };
        tokio::time::sleep(pause).await;

        if status.phase == TransformPhase::Running {
            interval = policy.next_interval(interval);
        }
    }
}
