//! The per-sample pipeline and the fan-out orchestrator.
//!
//! Every sample runs lookup, reserve, submit (or adopt), poll, retrieve and
//! commit as one future. All of a batch's futures are driven from the
//! caller's task under a semaphore, so one sample's failure is only ever
//! recorded in that sample's [`SampleResult`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use sxflow_cache::{CacheRecord, CacheStore, CachedFile, RecordMeta, Reservation, ReservationGuard};
use sxflow_remote::{ControlPlane, ObjectStore, RemoteError, TransformPhase, retry};
use sxflow_resource::{DeliveryMode, Fingerprint, SampleDescriptor, TransformRequest, fingerprint};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::retriever::{Retrieval, Retriever};
use crate::shared::SharedCache;
use crate::{
    ArtifactLocation, BatchError, BatchResult, DeliverOptions, DeliveredArtifact, DeliveryError,
    SampleResult, poll_to_terminal,
};

pub struct Deliverer<C, O> {
    control:   C,
    retriever: Retriever<O>,
    cache:     SharedCache,
    options:   DeliverOptions,
    endpoint:  String,
}

impl<C: ControlPlane, O: ObjectStore> Deliverer<C, O> {
    pub fn new(control: C, objects: O, cache: CacheStore, options: DeliverOptions) -> Self {
        Self {
            control,
            retriever: Retriever::new(objects, &options),
            cache: SharedCache::new(cache, Duration::from_millis(options.cache_wait_ms)),
            options,
            endpoint: "default".to_string(),
        }
    }

    /// Name under which code generators are cached.
    pub fn with_endpoint(mut self, name: impl Into<String>) -> Self {
        self.endpoint = name.into();
        self
    }

    pub fn options(&self) -> &DeliverOptions { &self.options }

    pub fn cache(&self) -> &CacheStore { self.cache.store() }

    /// Deliver every sample in `batch` with at most `concurrency_limit`
    /// pipelines in flight.
    pub async fn deliver(
        &self,
        batch: Vec<SampleDescriptor>,
        concurrency_limit: usize,
    ) -> Result<BatchResult, BatchError> {
        self.deliver_with_cancel(batch, concurrency_limit, CancellationToken::new())
            .await
    }

    /// Like [`deliver`](Self::deliver). Cancelling `cancel` resolves every
    /// unfinished sample to [`DeliveryError::Canceled`] and releases its
    /// reservation.
    pub async fn deliver_with_cancel(
        &self,
        batch: Vec<SampleDescriptor>,
        concurrency_limit: usize,
        cancel: CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        if concurrency_limit == 0 {
            return Err(BatchError::ZeroConcurrency);
        }
        let mut names = HashSet::new();
        for desc in &batch {
            if !names.insert(desc.name.as_str()) {
                return Err(BatchError::DuplicateName(desc.name.clone()));
            }
        }

        let permits = Semaphore::new(concurrency_limit);
        let mut pending = FuturesUnordered::new();
        for desc in batch {
            let permits = &permits;
            let cancel = &cancel;
            pending.push(async move {
                let span = tracing::info_span!("sample", sample = %desc.name);
                let result = async {
                    let _permit = tokio::select! {
                        permit = permits.acquire() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return SampleResult::failed(DeliveryError::Canceled),
                        },
                        _ = cancel.cancelled() => return SampleResult::failed(DeliveryError::Canceled),
                    };
                    self.deliver_sample(&desc, cancel).await
                }
                .instrument(span)
                .await;
                (desc.name, result)
            });
        }

        let mut results = BatchResult::default();
        while let Some((name, result)) = pending.next().await {
            if let Some(error) = result.error() {
                tracing::warn!(sample = %name, kind = ?error.kind(), error = %error, "Sample failed");
            }
            results.insert(name, result);
        }
        tracing::info!(
            samples = results.len(),
            failed = results.failures().count(),
            "Batch finished"
        );
        Ok(results)
    }

    async fn deliver_sample(&self, desc: &SampleDescriptor, cancel: &CancellationToken) -> SampleResult {
        let fp = match fingerprint(desc) {
            Ok(fp) => fp,
            Err(e) => return SampleResult::failed(e.into()),
        };
        tracing::debug!(fingerprint = fp.short(), "Fingerprint computed");

        let mut slot: Option<ReservationGuard> = None;
        let outcome = {
            let run = self.run(desc, &fp, &mut slot);
            tokio::select! {
                outcome = run => outcome,
                _ = cancel.cancelled() => Err(DeliveryError::Canceled),
            }
        };

        if let Some(guard) = slot.take() {
            let finished = match &outcome {
                Err(DeliveryError::PollingTimedOut { .. }) => {
                    self.cache.run(move |_| guard.abandon()).await
                }
                _ => self.cache.run(move |_| guard.release()).await,
            };
            if let Err(e) = finished {
                tracing::warn!(fingerprint = fp.short(), error = %e, "Failed to finish reservation");
            }
            self.cache.wake(&fp);
        }

        match outcome {
            Ok(result) => result,
            Err(error) => SampleResult::failed(error),
        }
    }

    /// Serve from the cache, or take the reservation and fulfil it. Waits
    /// while another pipeline holds the fingerprint.
    async fn run(
        &self,
        desc: &SampleDescriptor,
        fp: &Fingerprint,
        slot: &mut Option<ReservationGuard>,
    ) -> Result<SampleResult, DeliveryError> {
        let mode = self.options.mode;
        loop {
            if !desc.ignore_cache {
                let key = fp.clone();
                let hit = self
                    .cache
                    .run(move |store| Ok(store.lookup(&key)?.filter(|r| r.serves(mode))))
                    .await?;
                if let Some(record) = hit {
                    tracing::info!(transform_id = ?record.transform_id, "Cache hit");
                    return Ok(SampleResult::Delivered {
                        artifacts:  artifacts_from_record(&desc.name, &record, mode),
                        from_cache: true,
                    });
                }
            }

            let notify = self.cache.notifier(fp);
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let key = fp.clone();
            let meta = RecordMeta::from_descriptor(desc);
            match self.cache.run(move |store| store.reserve(&key, meta)).await? {
                Reservation::Granted(guard) => {
                    let previous = guard.previous().cloned();
                    // Another pipeline committed between our lookup and reserve.
                    if let Some(record) = previous
                        .as_ref()
                        .filter(|r| !desc.ignore_cache && r.is_valid() && r.serves(mode))
                    {
                        if let Some(transform_id) = record.transform_id.clone() {
                            let (files, urls) = recorded_lists(record);
                            self.cache
                                .run(move |_| guard.commit(&transform_id, files, urls))
                                .await?;
                            self.cache.wake(fp);
                            return Ok(SampleResult::Delivered {
                                artifacts:  artifacts_from_record(&desc.name, record, mode),
                                from_cache: true,
                            });
                        }
                    }
                    *slot = Some(guard);
                    return self.fulfil(desc, fp, previous, slot).await;
                }
                Reservation::AlreadyInFlight { transform_id } => {
                    tracing::debug!(
                        transform_id = ?transform_id,
                        "Fingerprint in flight elsewhere, waiting"
                    );
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep(self.cache.wait_interval()) => {}
                    }
                }
            }
        }
    }

    async fn fulfil(
        &self,
        desc: &SampleDescriptor,
        fp: &Fingerprint,
        previous: Option<CacheRecord>,
        slot: &mut Option<ReservationGuard>,
    ) -> Result<SampleResult, DeliveryError> {
        let transform_id = match self.revalidate(desc, fp, previous.as_ref()).await? {
            Some(id) => id,
            None => self.submit(desc, fp).await?,
        };

        let status =
            poll_to_terminal(&self.control, &transform_id, &self.options.poll, &self.options.retry)
                .await?;
        match status.phase {
            TransformPhase::Failed => {
                return Err(DeliveryError::TransformFailed {
                    transform_id,
                    summary: status
                        .error_summary
                        .unwrap_or_else(|| "no error summary reported".into()),
                });
            }
            TransformPhase::Canceled => return Err(DeliveryError::TransformCanceled { transform_id }),
            _ => {}
        }

        let retrieval = self.retrieve(desc, fp, &transform_id).await?;

        if status.phase == TransformPhase::CompletedWithErrors {
            tracing::warn!(
                transform_id = %transform_id,
                files_failed = status.files_failed,
                delivered = retrieval.artifacts.len(),
                "Transform completed with errors, result will not be cached"
            );
            if self.options.fail_if_incomplete {
                return Err(DeliveryError::PartialDelivery {
                    transform_id,
                    delivered: retrieval.artifacts.len(),
                    files_failed: status.files_failed,
                });
            }
            return Ok(SampleResult::Partial {
                artifacts: retrieval.artifacts,
                transform_id,
                files_failed: status.files_failed,
            });
        }

        if desc.ignore_cache {
            return Ok(SampleResult::Delivered {
                artifacts:  retrieval.artifacts,
                from_cache: false,
            });
        }

        // Keep the other mode's list when it came from this same transform.
        let reusable = previous
            .filter(|p| p.is_valid() && p.transform_id.as_deref() == Some(transform_id.as_str()));
        let (kept_files, kept_urls) = reusable.as_ref().map(recorded_lists).unwrap_or_default();
        let (files, urls) = match self.options.mode {
            DeliveryMode::Download => (Some(retrieval.files), kept_urls),
            DeliveryMode::SignedUrls => (kept_files, Some(retrieval.urls)),
        };

        let Some(guard) = slot.take() else {
            return Err(DeliveryError::Cache("reservation lost before commit".into()));
        };
        let id = transform_id.clone();
        self.cache.run(move |_| guard.commit(&id, files, urls)).await?;
        self.cache.wake(fp);
        tracing::info!(
            transform_id = %transform_id,
            artifacts = retrieval.artifacts.len(),
            "Delivered and cached"
        );
        Ok(SampleResult::Delivered {
            artifacts:  retrieval.artifacts,
            from_cache: false,
        })
    }

    /// Decide whether the transform recorded in `previous` can be reused.
    ///
    /// A transform the control plane still reports as live or complete is
    /// adopted. One that failed, was canceled, or is unknown is not.
    async fn revalidate(
        &self,
        desc: &SampleDescriptor,
        fp: &Fingerprint,
        previous: Option<&CacheRecord>,
    ) -> Result<Option<String>, DeliveryError> {
        if desc.ignore_cache {
            return Ok(None);
        }
        let Some(transform_id) = previous.and_then(|r| r.transform_id.clone()) else {
            return Ok(None);
        };

        match retry(&self.options.retry, "status", || self.control.status(&transform_id)).await {
            Ok(status) if matches!(status.phase, TransformPhase::Failed | TransformPhase::Canceled) => {
                tracing::info!(transform_id = %transform_id, phase = %status.phase, "Recorded transform ended, submitting again");
                Ok(None)
            }
            Ok(status) => {
                tracing::info!(transform_id = %transform_id, phase = %status.phase, "Adopting recorded transform");
                self.attach(fp, &transform_id).await?;
                Ok(Some(transform_id))
            }
            Err(RemoteError::NotFound(_)) => {
                tracing::info!(transform_id = %transform_id, "Recorded transform is unknown, submitting again");
                Ok(None)
            }
            Err(e) => Err(DeliveryError::from_control(e)),
        }
    }

    async fn submit(&self, desc: &SampleDescriptor, fp: &Fingerprint) -> Result<String, DeliveryError> {
        let request = TransformRequest::from_descriptor(desc);
        let transform_id = retry(&self.options.retry, "submit", || self.control.submit(&request))
            .await
            .map_err(DeliveryError::from_control)?;
        tracing::info!(transform_id = %transform_id, "Submitted transform");
        self.attach(fp, &transform_id).await?;
        Ok(transform_id)
    }

    async fn attach(&self, fp: &Fingerprint, transform_id: &str) -> Result<(), DeliveryError> {
        let key = fp.clone();
        let id = transform_id.to_string();
        self.cache
            .run(move |store| store.attach_transform(&key, &id))
            .await
    }

    async fn retrieve(
        &self,
        desc: &SampleDescriptor,
        fp: &Fingerprint,
        transform_id: &str,
    ) -> Result<Retrieval, DeliveryError> {
        let objects = self.retriever.list(transform_id).await?;
        tracing::debug!(transform_id = %transform_id, objects = objects.len(), "Listed artifacts");
        match self.options.mode {
            DeliveryMode::SignedUrls => {
                self.retriever
                    .sign_all(&desc.name, transform_id, &objects)
                    .await
            }
            DeliveryMode::Download => {
                let destination = self.cache.store().artifact_dir(fp);
                self.retriever
                    .download_all(&desc.name, transform_id, &objects, destination)
                    .await
            }
        }
    }

    /// Available code generators, from the cache unless `refresh` is set.
    pub async fn code_generators(&self, refresh: bool) -> Result<BTreeMap<String, String>, DeliveryError> {
        if !refresh {
            let endpoint = self.endpoint.clone();
            if let Some(entry) = self.cache.run(move |store| store.codegens(&endpoint)).await? {
                return Ok(entry.generators);
            }
        }
        let generators = retry(&self.options.retry, "code_generators", || {
            self.control.code_generators()
        })
        .await
        .map_err(DeliveryError::from_control)?;

        let endpoint = self.endpoint.clone();
        let cached = generators.clone();
        self.cache
            .run(move |store| store.put_codegens(&endpoint, cached))
            .await?;
        Ok(generators)
    }

    /// Check every descriptor names a code generator the endpoint offers.
    pub async fn validate_codegens(&self, batch: &[SampleDescriptor]) -> Result<(), DeliveryError> {
        let known = self.code_generators(false).await?;
        let unknown: BTreeSet<&str> = batch
            .iter()
            .map(|d| d.codegen.trim())
            .filter(|c| !known.contains_key(*c))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        Err(DeliveryError::MalformedDescriptor(format!(
            "unknown code generator(s): {} (available: {})",
            unknown.into_iter().collect::<Vec<_>>().join(", "),
            known.keys().cloned().collect::<Vec<_>>().join(", ")
        )))
    }
}

/// The artifact lists of `record`, `None` for modes it never retrieved.
fn recorded_lists(record: &CacheRecord) -> (Option<Vec<CachedFile>>, Option<Vec<String>>) {
    let has = |mode| record.retrieved.contains(&mode);
    (
        has(DeliveryMode::Download).then(|| record.files.clone()),
        has(DeliveryMode::SignedUrls).then(|| record.signed_urls.clone()),
    )
}

fn artifacts_from_record(sample: &str, record: &CacheRecord, mode: DeliveryMode) -> Vec<DeliveredArtifact> {
    let artifact = |location| DeliveredArtifact {
        sample: sample.to_string(),
        location,
    };
    match mode {
        DeliveryMode::Download => record
            .files
            .iter()
            .map(|f| {
                artifact(ArtifactLocation::Local {
                    path: f.path.clone(),
                    size: f.size,
                })
            })
            .collect(),
        DeliveryMode::SignedUrls => record
            .signed_urls
            .iter()
            .map(|u| artifact(ArtifactLocation::Url(u.clone())))
            .collect(),
    }
}
