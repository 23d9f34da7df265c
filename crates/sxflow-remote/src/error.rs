//! Error types for sxflow-remote.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// A network failure or server-side error worth retrying.
    #[error("transient error: {0}")]
    Transient(String),

    /// The service refused the request (bad query, quota, auth).
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// The service answered with something that could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid endpoint configuration: {0}")]
    Config(String),

    /// Transient failures outlasted the retry budget.
    #[error("unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: u32, last: String },
}

impl RemoteError {
    pub fn is_transient(&self) -> bool { matches!(self, Self::Transient(_)) }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
