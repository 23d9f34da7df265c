use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sxflow_cache::CacheStore;
use sxflow_resource::Fingerprint;
use tokio::sync::Notify;

use crate::DeliveryError;

/// The cache store as seen from async pipelines.
///
/// Store calls run on the blocking pool. Pipelines waiting on a reservation
/// held in this process are woken through a per-fingerprint [`Notify`];
/// reservations held by other processes are re-checked every `wait_interval`.
pub(crate) struct SharedCache {
    store:         CacheStore,
    waiters:       Mutex<HashMap<Fingerprint, Arc<Notify>>>,
    wait_interval: Duration,
}

impl SharedCache {
    pub fn new(store: CacheStore, wait_interval: Duration) -> Self {
        Self {
            store,
            waiters: Mutex::new(HashMap::new()),
            wait_interval,
        }
    }

    pub fn store(&self) -> &CacheStore { &self.store }

    pub fn wait_interval(&self) -> Duration { self.wait_interval }

    pub async fn run<T, F>(&self, op: F) -> Result<T, DeliveryError>
    where
        F: FnOnce(&CacheStore) -> sxflow_cache::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| DeliveryError::Cache(format!("cache task failed: {e}")))?
            .map_err(DeliveryError::from)
    }

    pub fn notifier(&self, fp: &Fingerprint) -> Arc<Notify> {
        let mut waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
        waiters.entry(fp.clone()).or_default().clone()
    }

    /// Wake every pipeline in this process waiting on `fp`.
    pub fn wake(&self, fp: &Fingerprint) {
        let notify = {
            let mut waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
            waiters.remove(fp)
        };
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }
}
