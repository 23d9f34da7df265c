use serde::{Deserialize, Serialize};

use crate::{DatasetRef, QueryValue, ResourceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Parquet,
    RootFile,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::RootFile => "root-file",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Whether artifacts are downloaded locally or handed back as signed URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Download,
    SignedUrls,
}

/// One named request in a batch. Immutable once handed to a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDescriptor {
    pub name:         String,
    pub dataset:      DatasetRef,
    pub query:        QueryValue,
    #[serde(default)]
    pub format:       OutputFormat,
    pub codegen:      String,
    #[serde(default)]
    pub file_limit:   Option<u32>,
    #[serde(default)]
    pub tree_name:    Option<String>,
    #[serde(default)]
    pub ignore_cache: bool,
}

impl SampleDescriptor {
    pub fn new(
        name: impl Into<String>,
        dataset: DatasetRef,
        query: QueryValue,
        codegen: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dataset,
            query,
            format: OutputFormat::default(),
            codegen: codegen.into(),
            file_limit: None,
            tree_name: None,
            ignore_cache: false,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_limit(mut self, limit: u32) -> Self {
        self.file_limit = Some(limit);
        self
    }

    pub fn with_tree_name(mut self, tree: impl Into<String>) -> Self {
        self.tree_name = Some(tree.into());
        self
    }

    pub fn ignoring_cache(mut self) -> Self {
        self.ignore_cache = true;
        self
    }

    /// Checks everything a pipeline relies on before any remote call.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ResourceError::MalformedDescriptor("sample name is empty".into()));
        }
        if self.dataset.is_empty() {
            return Err(ResourceError::MalformedDescriptor(format!(
                "sample {:?} has an empty dataset",
                self.name
            )));
        }
        if self.codegen.trim().is_empty() {
            return Err(ResourceError::MalformedDescriptor(format!(
                "sample {:?} has no code generator",
                self.name
            )));
        }
        if self.file_limit == Some(0) {
            return Err(ResourceError::MalformedDescriptor(format!(
                "sample {:?} has a file limit of zero",
                self.name
            )));
        }
        self.query.validate().map_err(|e| match e {
            ResourceError::MalformedDescriptor(msg) => {
                ResourceError::MalformedDescriptor(format!("sample {:?}: {msg}", self.name))
            }
        })
    }
}
