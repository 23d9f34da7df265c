//! Error types for sxflow-deliver.

use std::time::Duration;

use sxflow_remote::RemoteError;
use thiserror::Error;

/// The kind of a [`DeliveryError`], for matching without the details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedDescriptor,
    ControlPlaneUnavailable,
    SubmissionRejected,
    PollingTimedOut,
    TransformFailed,
    TransformCanceled,
    PartialDelivery,
    RetrievalFailed,
    Cache,
    Canceled,
}

/// Why one sample was not delivered. Always scoped to that sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("control plane unavailable after {attempts} attempt(s): {last}")]
    ControlPlaneUnavailable { attempts: u32, last: String },

    #[error("submission rejected ({status}): {message}")]
    SubmissionRejected { status: u16, message: String },

    #[error("transform {transform_id} did not finish within {waited:?}")]
    PollingTimedOut {
        transform_id: String,
        waited:       Duration,
    },

    #[error("transform {transform_id} failed: {summary}")]
    TransformFailed {
        transform_id: String,
        summary:      String,
    },

    #[error("transform {transform_id} was canceled")]
    TransformCanceled { transform_id: String },

    #[error("transform {transform_id} delivered {delivered} artifact(s) but {files_failed} input file(s) failed")]
    PartialDelivery {
        transform_id: String,
        delivered:    usize,
        files_failed: u64,
    },

    #[error("retrieval of {object} failed: {reason}")]
    RetrievalFailed { object: String, reason: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("delivery canceled")]
    Canceled,
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedDescriptor(_) => ErrorKind::MalformedDescriptor,
            Self::ControlPlaneUnavailable { .. } => ErrorKind::ControlPlaneUnavailable,
            Self::SubmissionRejected { .. } => ErrorKind::SubmissionRejected,
            Self::PollingTimedOut { .. } => ErrorKind::PollingTimedOut,
            Self::TransformFailed { .. } => ErrorKind::TransformFailed,
            Self::TransformCanceled { .. } => ErrorKind::TransformCanceled,
            Self::PartialDelivery { .. } => ErrorKind::PartialDelivery,
            Self::RetrievalFailed { .. } => ErrorKind::RetrievalFailed,
            Self::Cache(_) => ErrorKind::Cache,
            Self::Canceled => ErrorKind::Canceled,
        }
    }

    /// Map a control-plane error from submit or status.
    pub(crate) fn from_control(e: RemoteError) -> Self {
        match e {
            RemoteError::Unavailable { attempts, last } => {
                Self::ControlPlaneUnavailable { attempts, last }
            }
            RemoteError::Rejected { status, message } => {
                Self::SubmissionRejected { status, message }
            }
            RemoteError::NotFound(what) => Self::SubmissionRejected {
                status:  404,
                message: format!("{what} not found"),
            },
            RemoteError::Transient(last) | RemoteError::Protocol(last) | RemoteError::Config(last) => {
                Self::ControlPlaneUnavailable { attempts: 1, last }
            }
        }
    }
}

impl From<sxflow_resource::ResourceError> for DeliveryError {
    fn from(e: sxflow_resource::ResourceError) -> Self {
        match e {
            sxflow_resource::ResourceError::MalformedDescriptor(msg) => Self::MalformedDescriptor(msg),
        }
    }
}

impl From<sxflow_cache::CacheError> for DeliveryError {
    fn from(e: sxflow_cache::CacheError) -> Self { Self::Cache(e.to_string()) }
}

/// Problems with the batch as a whole, reported before any sample runs.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("sample name {0:?} appears more than once in the batch")]
    DuplicateName(String),

    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,
}
