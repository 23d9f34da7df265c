use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sxflow_resource::{DeliveryMode, Fingerprint, OutputFormat, SampleDescriptor};
use sxflow_verify::{Expectation, verify_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Reserved by a delivery that has not finished.
    InFlight,
    /// Every artifact was retrieved and verified.
    Valid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Descriptive fields copied from the descriptor that created a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub title:   String,
    pub codegen: String,
    pub format:  OutputFormat,
}

impl RecordMeta {
    pub fn from_descriptor(desc: &SampleDescriptor) -> Self {
        Self {
            title:   desc.name.clone(),
            codegen: desc.codegen.clone(),
            format:  desc.format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub fingerprint:  Fingerprint,
    pub status:       RecordStatus,
    pub transform_id: Option<String>,
    #[serde(flatten)]
    pub meta:         RecordMeta,
    #[serde(default)]
    pub files:        Vec<CachedFile>,
    #[serde(default)]
    pub signed_urls:  Vec<String>,
    /// Modes whose artifact list was actually retrieved. An empty list for a
    /// retrieved mode is a complete answer.
    #[serde(default)]
    pub retrieved:    BTreeSet<DeliveryMode>,
    pub created_at:   DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CacheRecord {
    pub(crate) fn in_flight(fingerprint: Fingerprint, meta: RecordMeta) -> Self {
        Self {
            fingerprint,
            status: RecordStatus::InFlight,
            transform_id: None,
            meta,
            files: Vec::new(),
            signed_urls: Vec::new(),
            retrieved: BTreeSet::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_valid(&self) -> bool { self.status == RecordStatus::Valid }

    /// Whether this record can answer a request in `mode` without touching
    /// the remote side.
    pub fn serves(&self, mode: DeliveryMode) -> bool {
        if !self.is_valid() || !self.retrieved.contains(&mode) {
            return false;
        }
        match mode {
            DeliveryMode::SignedUrls => true,
            DeliveryMode::Download => self.files_present(),
        }
    }

    /// Every recorded file still exists with its recorded size.
    pub fn files_present(&self) -> bool {
        self.files
            .iter()
            .all(|f| verify_file(&f.path, &Expectation::size(f.size)).is_ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenEntry {
    pub fetched_at: DateTime<Utc>,
    /// Generator name to image.
    pub generators: BTreeMap<String, String>,
}
