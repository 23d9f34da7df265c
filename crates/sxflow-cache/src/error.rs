use std::path::PathBuf;

use sxflow_resource::Fingerprint;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Fs(#[from] sxflow_fs::Error),

    #[error("cache database {path} is corrupted: {source}")]
    Corrupt {
        path:   PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode cache database: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to remove {path}: {source}")]
    Remove {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record {0} is held by a live delivery")]
    InFlight(Fingerprint),
}

pub type Result<T> = std::result::Result<T, CacheError>;
