//! The object-store protocol.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::Result;

pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// One artifact produced by a transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    #[serde(alias = "filename")]
    pub name:   String,
    #[serde(alias = "total-bytes")]
    pub size:   u64,
    /// Hex SHA-256, when the store publishes one.
    #[serde(default)]
    pub sha256: Option<String>,
}

pub trait ObjectStore: Send + Sync {
    fn list(&self, transform_id: &str) -> impl Future<Output = Result<Vec<RemoteObject>>> + Send;

    /// Stream an object's bytes.
    fn fetch(
        &self,
        transform_id: &str,
        object: &RemoteObject,
    ) -> impl Future<Output = Result<BoxStream<'static, Result<Bytes>>>> + Send;

    /// A URL the caller can download the object from directly.
    fn sign(&self, transform_id: &str, object: &RemoteObject) -> impl Future<Output = Result<String>> + Send;
}

impl<T: ObjectStore> ObjectStore for Arc<T> {
    fn list(&self, transform_id: &str) -> impl Future<Output = Result<Vec<RemoteObject>>> + Send {
        (**self).list(transform_id)
    }

    fn fetch(
        &self,
        transform_id: &str,
        object: &RemoteObject,
    ) -> impl Future<Output = Result<BoxStream<'static, Result<Bytes>>>> + Send {
        (**self).fetch(transform_id, object)
    }

    fn sign(&self, transform_id: &str, object: &RemoteObject) -> impl Future<Output = Result<String>> + Send {
        (**self).sign(transform_id, object)
    }
}
