//! Dataset identity.

use serde::{Deserialize, Serialize};

const DEFAULT_SCHEME: &str = "rucio";

/// Where the input files for a sample come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetRef {
    /// A catalogue dataset identifier. A bare name is taken to be a rucio DID.
    Did(String),
    /// Explicit input file paths or URLs.
    FileList(Vec<String>),
}

impl DatasetRef {
    pub fn did(name: impl Into<String>) -> Self { Self::Did(name.into()) }

    pub fn files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::FileList(files.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Did(did) => did.trim().is_empty(),
            Self::FileList(files) => files.is_empty() || files.iter().any(|f| f.trim().is_empty()),
        }
    }

    /// The DID in `scheme://name` form, with `?files=N` appended when a file
    /// limit applies. `None` for file lists.
    pub fn render_did(&self, file_limit: Option<u32>) -> Option<String> {
        let Self::Did(did) = self else {
            return None;
        };
        let did = did.trim();
        let mut rendered = if did.contains("://") {
            did.to_string()
        } else {
            format!("{DEFAULT_SCHEME}://{did}")
        };
        if let Some(limit) = file_limit {
            rendered.push_str(&format!("?files={limit}"));
        }
        Some(rendered)
    }

    pub fn file_list(&self) -> Option<&[String]> {
        match self {
            Self::FileList(files) => Some(files),
            Self::Did(_) => None,
        }
    }
}
