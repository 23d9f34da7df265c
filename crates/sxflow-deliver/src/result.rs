//! Per-sample outcomes and the batch result.
//!
//! A [`SampleResult`] never fails on construction. Errors surface only when
//! the caller asks for the artifacts, so a batch can be walked entry by entry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{DeliveryError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    Local { path: PathBuf, size: u64 },
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredArtifact {
    pub sample:   String,
    pub location: ArtifactLocation,
}

impl DeliveredArtifact {
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            ArtifactLocation::Local { path, .. } => Some(path),
            ArtifactLocation::Url(_) => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match &self.location {
            ArtifactLocation::Url(url) => Some(url),
            ArtifactLocation::Local { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleResult {
    Delivered {
        artifacts:  Vec<DeliveredArtifact>,
        /// Served from the local cache without contacting the control plane.
        from_cache: bool,
    },
    /// The transform finished with failed input files. Never cached.
    Partial {
        artifacts:    Vec<DeliveredArtifact>,
        transform_id: String,
        files_failed: u64,
    },
    Failed { error: DeliveryError },
}

impl SampleResult {
    pub fn failed(error: DeliveryError) -> Self { Self::Failed { error } }

    /// True unless the sample failed outright.
    pub fn is_valid(&self) -> bool { !matches!(self, Self::Failed { .. }) }

    pub fn is_complete(&self) -> bool { matches!(self, Self::Delivered { .. }) }

    pub fn from_cache(&self) -> bool { matches!(self, Self::Delivered { from_cache: true, .. }) }

    /// The delivered artifacts, including those of a partial delivery.
    pub fn artifacts(&self) -> Result<&[DeliveredArtifact], DeliveryError> {
        match self {
            Self::Delivered { artifacts, .. } | Self::Partial { artifacts, .. } => Ok(artifacts),
            Self::Failed { error } => Err(error.clone()),
        }
    }

    /// Like [`artifacts`](Self::artifacts), but a partial delivery is an error.
    pub fn require_complete(&self) -> Result<&[DeliveredArtifact], DeliveryError> {
        match self {
            Self::Delivered { artifacts, .. } => Ok(artifacts),
            Self::Partial {
                artifacts,
                transform_id,
                files_failed,
            } => Err(DeliveryError::PartialDelivery {
                transform_id: transform_id.clone(),
                delivered:    artifacts.len(),
                files_failed: *files_failed,
            }),
            Self::Failed { error } => Err(error.clone()),
        }
    }

    pub fn error(&self) -> Option<&DeliveryError> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// `PartialDelivery` for partial results, the failure kind for failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Delivered { .. } => None,
            Self::Partial { .. } => Some(ErrorKind::PartialDelivery),
            Self::Failed { error } => Some(error.kind()),
        }
    }
}

/// Outcomes of one batch, keyed by sample name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    samples: BTreeMap<String, SampleResult>,
}

impl BatchResult {
    pub(crate) fn insert(&mut self, name: String, result: SampleResult) {
        self.samples.insert(name, result);
    }

    pub fn get(&self, name: &str) -> Option<&SampleResult> { self.samples.get(name) }

    pub fn len(&self) -> usize { self.samples.len() }

    pub fn is_empty(&self) -> bool { self.samples.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SampleResult)> {
        self.samples.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DeliveryError)> {
        self.iter().filter_map(|(name, r)| r.error().map(|e| (name, e)))
    }

    pub fn all_valid(&self) -> bool { self.samples.values().all(SampleResult::is_valid) }

    pub fn into_inner(self) -> BTreeMap<String, SampleResult> { self.samples }
}

impl IntoIterator for BatchResult {
    type Item = (String, SampleResult);
    type IntoIter = std::collections::btree_map::IntoIter<String, SampleResult>;

    fn into_iter(self) -> Self::IntoIter { self.samples.into_iter() }
}
