//! Batch files: a `general` section and a list of samples, in TOML or JSON.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sxflow_resource::{DeliveryMode, SampleDescriptor};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct General {
    pub mode:         Option<DeliveryMode>,
    pub ignore_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchFile {
    #[serde(default)]
    pub general: General,
    #[serde(alias = "samples")]
    pub sample:  Vec<SampleDescriptor>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonBatch {
    Full(BatchFile),
    Samples(Vec<SampleDescriptor>),
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read batch file {}", path.display()))?;
        let is_toml = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let batch = if is_toml {
            Self::from_toml(&text)
        } else {
            Self::from_json(&text)
        }
        .with_context(|| format!("invalid batch file {}", path.display()))?;

        if batch.sample.is_empty() {
            bail!("batch file {} has no samples", path.display());
        }
        Ok(batch)
    }

    pub fn from_toml(text: &str) -> Result<Self> { Ok(toml::from_str(text)?) }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(match serde_json::from_str(text)? {
            JsonBatch::Full(batch) => batch,
            JsonBatch::Samples(sample) => Self {
                general: General::default(),
                sample,
            },
        })
    }

    /// Descriptors with the batch-wide `ignore_cache` applied.
    pub fn into_samples(self, ignore_cache: bool) -> Vec<SampleDescriptor> {
        let bypass = ignore_cache || self.general.ignore_cache;
        self.sample
            .into_iter()
            .map(|s| if bypass { s.ignoring_cache() } else { s })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use sxflow_resource::{DatasetRef, QueryValue};

    use super::*;

    #[test]
    fn test_toml_batch() {
        let batch = BatchFile::from_toml(
            r#"
            [general]
            mode = "signed_urls"

            [[sample]]
            name = "ttbar"
            codegen = "atlasr22"
            file_limit = 10
            dataset = { did = "mc20_13TeV:mc20_13TeV.601229.ttbar.DAOD_PHYS" }
            query = { kind = "text", value = "(call Select (call EventDataset) e)" }

            [[sample]]
            name = "zee"
            codegen = "uproot"
            tree_name = "CollectionTree"
            dataset = { file_list = ["root://eos/zee_1.root", "root://eos/zee_2.root"] }
            query = { kind = "structured", value = { filter_name = ["el_pt"], cut = "el_pt > 25" } }
            "#,
        )
        .unwrap();

        assert_eq!(batch.general.mode, Some(DeliveryMode::SignedUrls));
        assert_eq!(batch.sample.len(), 2);
        assert_eq!(batch.sample[0].file_limit, Some(10));
        assert_eq!(batch.sample[1].dataset, DatasetRef::files(["root://eos/zee_1.root", "root://eos/zee_2.root"]));
        assert!(matches!(batch.sample[1].query, QueryValue::Structured(_)));
    }

    #[test]
    fn test_json_array_and_ignore_cache() {
        let batch = BatchFile::from_json(
            r#"[{
                "name": "ttbar",
                "codegen": "atlasr22",
                "dataset": {"did": "mc:ttbar"},
                "query": {"kind": "text", "value": "q"}
            }]"#,
        )
        .unwrap();
        assert_eq!(batch.general, General::default());
        let samples = batch.into_samples(true);
        assert!(samples[0].ignore_cache);
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(&path, r#"{"sample": []}"#).unwrap();
        assert!(BatchFile::load(&path).is_err());
        assert!(BatchFile::load(&dir.path().join("missing.toml")).is_err());
    }
}
