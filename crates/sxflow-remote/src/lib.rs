//! Remote collaborators of the delivery engine.
//!
//! [`ControlPlane`] submits transforms and reports their status;
//! [`ObjectStore`] lists, streams and signs the artifacts a transform
//! produced. Both are plain traits so the engine can be driven by the
//! reqwest-backed [`HttpControlPlane`]/[`HttpObjectStore`] or by in-memory
//! fakes.
//!
//! Errors are classified once, at the transport edge: only
//! [`RemoteError::Transient`] is retried by [`retry`].

pub use self::control::{ControlPlane, StatusReport, TransformPhase, TransformStatus};
pub use self::error::{RemoteError, Result};
pub use self::object::{BoxStream, ObjectStore, RemoteObject};
pub use self::retry::{RetryPolicy, retry, retry_delay};

#[cfg(feature = "reqwest")]
pub use self::http::{DEFAULT_REQUEST_TIMEOUT, Endpoint, HttpControlPlane, HttpObjectStore, build_client};

mod control;
mod error;
#[cfg(feature = "reqwest")]
mod http;
mod object;
mod retry;
