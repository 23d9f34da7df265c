//! Sample descriptors and their identity.
//!
//! A [`SampleDescriptor`] names one dataset/query extraction. Its
//! [`Fingerprint`] is what the cache keys on, so two samples asking for the
//! same thing under different names share one remote transform.

pub use self::dataset::DatasetRef;
pub use self::descriptor::{DeliveryMode, OutputFormat, SampleDescriptor};
pub use self::error::{ResourceError, Result};
pub use self::fingerprint::{FINGERPRINT_VERSION, Fingerprint, fingerprint};
pub use self::query::QueryValue;
pub use self::request::TransformRequest;

mod dataset;
mod descriptor;
mod error;
mod fingerprint;
mod query;
mod request;
