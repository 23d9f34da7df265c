//! Object-store retrieval for a finished transform.
//!
//! Downloads land in a staging workspace inside the sample's artifact
//! directory and are moved into place only when every object verified, so a
//! failed retrieval never leaves a half-written file under a final name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt, stream};
use sxflow_cache::CachedFile;
use sxflow_fs::Workspace;
use sxflow_remote::{ObjectStore, RemoteError, RemoteObject, RetryPolicy, retry};
use sxflow_verify::{Expectation, StreamVerifier, VerificationError};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::naming::local_names;
use crate::{ArtifactLocation, DeliverOptions, DeliveredArtifact, DeliveryError};

/// What one retrieval produced, in listing order.
#[derive(Debug, Default)]
pub(crate) struct Retrieval {
    pub artifacts: Vec<DeliveredArtifact>,
    pub files:     Vec<CachedFile>,
    pub urls:      Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error(transparent)]
    Remote(RemoteError),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Verify(VerificationError),
}

impl AttemptError {
    fn retryable(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_transient(),
            Self::Io(_) => true,
            Self::Verify(e) => !matches!(e, VerificationError::InvalidDigest(_)),
        }
    }
}

pub struct Retriever<O> {
    store:                O,
    connections:          Arc<Semaphore>,
    retry:                RetryPolicy,
    download_concurrency: usize,
    artifact_attempts:    u32,
    shorten_filenames:    bool,
}

impl<O: ObjectStore> Retriever<O> {
    pub fn new(store: O, options: &DeliverOptions) -> Self {
        Self {
            store,
            connections: Arc::new(Semaphore::new(options.max_connections.max(1))),
            retry: options.retry,
            download_concurrency: options.download_concurrency.max(1),
            artifact_attempts: options.artifact_attempts.max(1),
            shorten_filenames: options.shorten_filenames,
        }
    }

    pub(crate) async fn list(&self, transform_id: &str) -> Result<Vec<RemoteObject>, DeliveryError> {
        retry(&self.retry, "list", || self.store.list(transform_id))
            .await
            .map_err(|e| DeliveryError::RetrievalFailed {
                object: format!("result listing of {transform_id}"),
                reason: e.to_string(),
            })
    }

    /// Signed URLs for every object. No local I/O.
    pub(crate) async fn sign_all(
        &self,
        sample: &str,
        transform_id: &str,
        objects: &[RemoteObject],
    ) -> Result<Retrieval, DeliveryError> {
        let urls: Vec<String> = stream::iter(objects)
            .map(|object| async move {
                retry(&self.retry, "sign", || self.store.sign(transform_id, object))
                    .await
                    .map_err(|e| DeliveryError::RetrievalFailed {
                        object: object.name.clone(),
                        reason: e.to_string(),
                    })
            })
            .buffered(self.download_concurrency)
            .try_collect()
            .await?;

        let artifacts = urls
            .iter()
            .map(|url| DeliveredArtifact {
                sample:   sample.to_string(),
                location: ArtifactLocation::Url(url.clone()),
            })
            .collect();
        Ok(Retrieval {
            artifacts,
            files: Vec::new(),
            urls,
        })
    }

    /// Download and verify every object into `destination`.
    pub(crate) async fn download_all(
        &self,
        sample: &str,
        transform_id: &str,
        objects: &[RemoteObject],
        destination: PathBuf,
    ) -> Result<Retrieval, DeliveryError> {
        let names = local_names(objects.iter().map(|o| o.name.as_str()), self.shorten_filenames)
            .ok_or_else(|| DeliveryError::RetrievalFailed {
                object: format!("result listing of {transform_id}"),
                reason: "objects map to the same local file name".into(),
            })?;

        let workspace = {
            let destination = destination.clone();
            tokio::task::spawn_blocking(move || Workspace::new(destination))
                .await
                .map_err(|e| DeliveryError::Cache(e.to_string()))?
                .map_err(|e| DeliveryError::Cache(e.to_string()))?
        };
        let staging = workspace.path().to_path_buf();

        let downloaded: Result<Vec<(String, u64)>, DeliveryError> = stream::iter(objects.iter().zip(names))
            .map(|(object, name)| self.download_one(transform_id, object, name, &staging))
            .buffered(self.download_concurrency)
            .try_collect()
            .await;

        let downloaded = match downloaded {
            Ok(downloaded) => downloaded,
            Err(e) => {
                let _ = tokio::task::spawn_blocking(move || drop(workspace)).await;
                return Err(e);
            }
        };

        tokio::task::spawn_blocking(move || workspace.commit())
            .await
            .map_err(|e| DeliveryError::Cache(e.to_string()))?
            .map_err(|e| DeliveryError::Cache(e.to_string()))?;

        let files: Vec<CachedFile> = downloaded
            .into_iter()
            .map(|(name, size)| CachedFile {
                path: destination.join(name),
                size,
            })
            .collect();
        let artifacts = files
            .iter()
            .map(|f| DeliveredArtifact {
                sample:   sample.to_string(),
                location: ArtifactLocation::Local {
                    path: f.path.clone(),
                    size: f.size,
                },
            })
            .collect();
        Ok(Retrieval {
            artifacts,
            files,
            urls: Vec::new(),
        })
    }

    async fn download_one(
        &self,
        transform_id: &str,
        object: &RemoteObject,
        name: String,
        staging: &Path,
    ) -> Result<(String, u64), DeliveryError> {
        let path = staging.join(&name);
        let failed = |reason: String| DeliveryError::RetrievalFailed {
            object: object.name.clone(),
            reason,
        };

        let mut expected = Expectation::size(object.size);
        if let Some(digest) = &object.sha256 {
            expected = expected.with_sha256_hex(digest).map_err(|e| failed(e.to_string()))?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = {
                let _permit = self
                    .connections
                    .acquire()
                    .await
                    .map_err(|_| failed("connection pool closed".into()))?;
                self.attempt(transform_id, object, &path, &expected).await
            };
            match outcome {
                Ok(size) => {
                    tracing::debug!(object = %object.name, size, attempt, "Artifact verified");
                    return Ok((name, size));
                }
                Err(e) if e.retryable() && attempt < self.artifact_attempts => {
                    let delay = self.retry.delay(attempt - 1);
                    tracing::warn!(
                        object = %object.name,
                        attempt,
                        max_attempts = self.artifact_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Artifact download failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(failed(format!("{e} (after {attempt} attempt(s))")));
                }
            }
        }
    }

    async fn attempt(
        &self,
        transform_id: &str,
        object: &RemoteObject,
        path: &Path,
        expected: &Expectation,
    ) -> Result<u64, AttemptError> {
        let mut body = self
            .store
            .fetch(transform_id, object)
            .await
            .map_err(AttemptError::Remote)?;
        let mut file = tokio::fs::File::create(path).await?;
        let mut verifier = StreamVerifier::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(AttemptError::Remote)?;
            verifier.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        verifier.finish(expected).map_err(AttemptError::Verify)
    }
}
