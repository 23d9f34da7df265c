#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use sxflow_cache::CacheStore;
use sxflow_deliver::{DeliverOptions, Deliverer, PollPolicy};
use sxflow_remote::{
    BoxStream, ControlPlane, ObjectStore, RemoteError, RemoteObject, Result, RetryPolicy,
    TransformPhase, TransformStatus,
};
use sxflow_resource::{DatasetRef, QueryValue, SampleDescriptor, TransformRequest};
use sxflow_verify::Sha256Hasher;

/// Scripted control plane. Every submitted transform walks through `script`;
/// the last phase repeats.
pub struct MockControlPlane {
    pub submit_attempts: AtomicUsize,
    pub submits:         AtomicUsize,
    pub codegen_calls:   AtomicUsize,
    transient_submits:   AtomicU32,
    rejection:           Mutex<Option<(u16, String)>>,
    script:              Mutex<Vec<TransformPhase>>,
    files_failed:        AtomicU64,
    transforms:          Mutex<HashMap<String, VecDeque<TransformPhase>>>,
    requests:            Mutex<Vec<TransformRequest>>,
    /// Submitted transforms not yet seen in a terminal phase.
    active:              Mutex<HashSet<String>>,
    peak_active:         AtomicUsize,
}

impl MockControlPlane {
    pub fn new() -> Self { Self::with_script(vec![TransformPhase::Running, TransformPhase::Completed]) }

    pub fn with_script(script: Vec<TransformPhase>) -> Self {
        Self {
            submit_attempts:   AtomicUsize::new(0),
            submits:           AtomicUsize::new(0),
            codegen_calls:     AtomicUsize::new(0),
            transient_submits: AtomicU32::new(0),
            rejection:         Mutex::new(None),
            script:            Mutex::new(script),
            files_failed:      AtomicU64::new(0),
            transforms:        Mutex::new(HashMap::new()),
            requests:          Mutex::new(Vec::new()),
            active:            Mutex::new(HashSet::new()),
            peak_active:       AtomicUsize::new(0),
        }
    }

    /// The next `n` submissions fail with a transient error.
    pub fn fail_submits(self, n: u32) -> Self {
        self.transient_submits.store(n, Ordering::SeqCst);
        self
    }

    pub fn reject(self, status: u16, message: &str) -> Self {
        *self.rejection.lock().unwrap() = Some((status, message.to_string()));
        self
    }

    pub fn with_failed_files(self, n: u64) -> Self {
        self.files_failed.store(n, Ordering::SeqCst);
        self
    }

    /// Make a transform known without submitting it.
    pub fn register(&self, transform_id: &str, phases: Vec<TransformPhase>) {
        self.transforms
            .lock()
            .unwrap()
            .insert(transform_id.to_string(), phases.into());
    }

    pub fn set_script(&self, script: Vec<TransformPhase>) { *self.script.lock().unwrap() = script; }

    pub fn submits(&self) -> usize { self.submits.load(Ordering::SeqCst) }

    pub fn requests(&self) -> Vec<TransformRequest> { self.requests.lock().unwrap().clone() }

    /// Most submitted transforms ever running at once.
    pub fn peak_active(&self) -> usize { self.peak_active.load(Ordering::SeqCst) }
}

impl ControlPlane for MockControlPlane {
    async fn submit(&self, request: &TransformRequest) -> Result<String> {
        self.submit_attempts.fetch_add(1, Ordering::SeqCst);
        // Let sibling pipelines run while the submission is "on the wire".
        tokio::time::sleep(Duration::from_millis(5)).await;

        if let Some((status, message)) = self.rejection.lock().unwrap().clone() {
            return Err(RemoteError::Rejected { status, message });
        }
        let remaining = self.transient_submits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_submits.store(remaining - 1, Ordering::SeqCst);
            return Err(RemoteError::Transient("connection reset".into()));
        }

        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        let transform_id = format!("tx-{n}");
        let script = self.script.lock().unwrap().clone();
        self.register(&transform_id, script);
        self.requests.lock().unwrap().push(request.clone());
        {
            let mut active = self.active.lock().unwrap();
            active.insert(transform_id.clone());
            self.peak_active.fetch_max(active.len(), Ordering::SeqCst);
        }
        Ok(transform_id)
    }

    async fn status(&self, transform_id: &str) -> Result<TransformStatus> {
        let phase = {
            let mut transforms = self.transforms.lock().unwrap();
            let Some(phases) = transforms.get_mut(transform_id) else {
                return Err(RemoteError::NotFound(transform_id.to_string()));
            };
            if phases.len() > 1 {
                phases.pop_front().unwrap()
            } else {
                *phases.front().unwrap()
            }
        };
        if phase.is_terminal() {
            self.active.lock().unwrap().remove(transform_id);
        }
        let files_failed = match phase {
            TransformPhase::CompletedWithErrors => self.files_failed.load(Ordering::SeqCst).max(1),
            _ => 0,
        };
        Ok(TransformStatus {
            transform_id: transform_id.to_string(),
            phase,
            files_total: Some(2),
            files_completed: if phase.has_artifacts() { 2 - files_failed.min(2) } else { 0 },
            files_failed,
            error_summary: (phase == TransformPhase::Failed).then(|| "bad selection".to_string()),
            log_url: None,
        })
    }

    async fn code_generators(&self) -> Result<BTreeMap<String, String>> {
        self.codegen_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BTreeMap::from([
            ("atlasr22".to_string(), "sslhep/func_adl:22".to_string()),
            ("uproot".to_string(), "sslhep/uproot:latest".to_string()),
        ]))
    }
}

/// Serves the same objects for every transform.
pub struct MockObjectStore {
    objects:         Vec<(String, Vec<u8>)>,
    publish_digests: bool,
    corrupt_fetches: AtomicU32,
    pub fetches:     AtomicUsize,
    pub signs:       AtomicUsize,
    pub lists:       AtomicUsize,
}

impl MockObjectStore {
    pub fn new(objects: &[(&str, &[u8])]) -> Self {
        Self {
            objects:         objects
                .iter()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
            publish_digests: false,
            corrupt_fetches: AtomicU32::new(0),
            fetches:         AtomicUsize::new(0),
            signs:           AtomicUsize::new(0),
            lists:           AtomicUsize::new(0),
        }
    }

    pub fn two_files() -> Self {
        Self::new(&[
            ("part-0000.parquet", b"first artifact payload".as_slice()),
            ("part-0001.parquet", b"second artifact payload, a bit longer".as_slice()),
        ])
    }

    pub fn with_digests(mut self) -> Self {
        self.publish_digests = true;
        self
    }

    /// The next `n` fetches deliver damaged bytes.
    pub fn corrupt(self, n: u32) -> Self {
        self.corrupt_fetches.store(n, Ordering::SeqCst);
        self
    }

    pub fn fetches(&self) -> usize { self.fetches.load(Ordering::SeqCst) }
}

impl ObjectStore for MockObjectStore {
    async fn list(&self, _transform_id: &str) -> Result<Vec<RemoteObject>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .objects
            .iter()
            .map(|(name, data)| RemoteObject {
                name:   name.clone(),
                size:   data.len() as u64,
                sha256: self.publish_digests.then(|| Sha256Hasher::hex_digest(data)),
            })
            .collect())
    }

    async fn fetch(
        &self,
        _transform_id: &str,
        object: &RemoteObject,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let Some((_, data)) = self.objects.iter().find(|(name, _)| *name == object.name) else {
            return Err(RemoteError::NotFound(object.name.clone()));
        };
        let mut data = data.clone();

        let remaining = self.corrupt_fetches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.corrupt_fetches.store(remaining - 1, Ordering::SeqCst);
            if self.publish_digests {
                if let Some(last) = data.last_mut() {
                    *last ^= 0xff;
                }
            } else {
                data.pop();
            }
        }

        let mid = data.len() / 2;
        let second = data.split_off(mid);
        let chunks = vec![Ok(Bytes::from(data)), Ok(Bytes::from(second))];
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }

    async fn sign(&self, transform_id: &str, object: &RemoteObject) -> Result<String> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://store.example/{transform_id}/{}?sig=abc", object.name))
    }
}

pub type TestDeliverer = Deliverer<Arc<MockControlPlane>, Arc<MockObjectStore>>;

pub fn fast_options() -> DeliverOptions {
    DeliverOptions {
        retry: RetryPolicy::immediate(3),
        poll: PollPolicy {
            initial_interval_ms: 1,
            max_interval_ms:     5,
            multiplier:          2.0,
            timeout_ms:          None,
        },
        cache_wait_ms: 10,
        ..DeliverOptions::default()
    }
}

pub fn deliverer(
    cache_root: &Path,
    control: &Arc<MockControlPlane>,
    objects: &Arc<MockObjectStore>,
    options: DeliverOptions,
) -> TestDeliverer {
    Deliverer::new(
        control.clone(),
        objects.clone(),
        CacheStore::open(cache_root).unwrap(),
        options,
    )
}

pub fn sample(name: &str) -> SampleDescriptor {
    SampleDescriptor::new(
        name,
        DatasetRef::did("mc20_13TeV:mc20_13TeV.601229.ttbar.DAOD_PHYS"),
        QueryValue::text("(call Select (call EventDataset) (lambda (list e) (attr e 'Jets')))"),
        "atlasr22",
    )
}

pub fn other_sample(name: &str) -> SampleDescriptor {
    SampleDescriptor::new(
        name,
        DatasetRef::did("mc20_13TeV:mc20_13TeV.700320.Zee.DAOD_PHYS"),
        QueryValue::text("(call Select (call EventDataset) (lambda (list e) (attr e 'Electrons')))"),
        "atlasr22",
    )
}
