//! The control-plane protocol.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sxflow_resource::TransformRequest;

use crate::Result;

/// Where a remote transform is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformPhase {
    Submitted,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Canceled,
}

impl TransformPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed | Self::Canceled
        )
    }

    /// Terminal phases that produced artifacts to retrieve.
    pub fn has_artifacts(&self) -> bool { matches!(self, Self::Completed | Self::CompletedWithErrors) }
}

impl std::fmt::Display for TransformPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed with errors",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// A snapshot of one transform, as returned by a single status call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformStatus {
    pub transform_id:    String,
    pub phase:           TransformPhase,
    pub files_total:     Option<u64>,
    pub files_completed: u64,
    pub files_failed:    u64,
    pub error_summary:   Option<String>,
    pub log_url:         Option<String>,
}

/// The status document served by the control plane.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusReport {
    pub status:          String,
    #[serde(default, alias = "request_id")]
    pub request_id:      Option<String>,
    #[serde(default)]
    pub files:           Option<u64>,
    #[serde(default)]
    pub files_completed: u64,
    #[serde(default)]
    pub files_failed:    u64,
    #[serde(default)]
    pub title:           Option<String>,
    #[serde(default)]
    pub log_url:         Option<String>,
    #[serde(default, alias = "error_message")]
    pub error_message:   Option<String>,
}

impl StatusReport {
    pub fn into_status(self, transform_id: &str) -> TransformStatus {
        let phase = match self.status.as_str() {
            "Submitted" | "Lookup" | "Pending Lookup" | "Looking" => TransformPhase::Submitted,
            "Complete" if self.files_failed > 0 => TransformPhase::CompletedWithErrors,
            "Complete" => TransformPhase::Completed,
            "Fatal" => TransformPhase::Failed,
            "Canceled" => TransformPhase::Canceled,
            "Running" => TransformPhase::Running,
            other => {
                tracing::debug!(transform_id, status = other, "Unrecognised status, treating as running");
                TransformPhase::Running
            }
        };
        let error_summary = self.error_message.or_else(|| {
            (self.files_failed > 0).then(|| format!("{} file(s) failed", self.files_failed))
        });
        TransformStatus {
            transform_id: self.request_id.unwrap_or_else(|| transform_id.to_string()),
            phase,
            files_total: self.files,
            files_completed: self.files_completed,
            files_failed: self.files_failed,
            error_summary,
            log_url: self.log_url,
        }
    }
}

/// Submit, status and code-generator listing. Each call is one round trip.
pub trait ControlPlane: Send + Sync {
    /// Start a transform and return its identifier.
    fn submit(&self, request: &TransformRequest) -> impl Future<Output = Result<String>> + Send;

    fn status(&self, transform_id: &str) -> impl Future<Output = Result<TransformStatus>> + Send;

    /// Available code generators, name to image.
    fn code_generators(&self) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send;
}

impl<T: ControlPlane> ControlPlane for Arc<T> {
    fn submit(&self, request: &TransformRequest) -> impl Future<Output = Result<String>> + Send {
        (**self).submit(request)
    }

    fn status(&self, transform_id: &str) -> impl Future<Output = Result<TransformStatus>> + Send {
        (**self).status(transform_id)
    }

    fn code_generators(&self) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send {
        (**self).code_generators()
    }
}
