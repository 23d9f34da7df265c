//! Stable sample identity.
//!
//! A fingerprint is the SHA-256 of a canonical JSON document built from the
//! parts of a descriptor that determine the remote result. The sample name and
//! the cache-bypass flag are deliberately absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{SampleDescriptor, query::canonicalize, Result};

/// Bumped whenever the canonical document changes shape.
pub const FINGERPRINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing hex digest, e.g. one read back from the cache.
    pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into()) }

    pub fn as_str(&self) -> &str { &self.0 }

    /// Leading characters, for log lines.
    pub fn short(&self) -> &str { self.0.get(..12).unwrap_or(&self.0) }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str { &self.0 }
}

fn canonical_document(desc: &SampleDescriptor) -> Value {
    let mut doc = Map::new();
    doc.insert("version".into(), Value::from(FINGERPRINT_VERSION));
    doc.insert(
        "dataset".into(),
        canonicalize(&serde_json::json!({
            "did": desc.dataset.render_did(desc.file_limit),
            "files": desc.dataset.file_list(),
        })),
    );
    doc.insert("file_limit".into(), Value::from(desc.file_limit));
    doc.insert("tree_name".into(), Value::from(desc.tree_name.clone()));
    doc.insert("query".into(), desc.query.canonical());
    doc.insert("format".into(), Value::from(desc.format.as_str()));
    doc.insert("codegen".into(), Value::from(desc.codegen.trim()));
    Value::Object(doc)
}

/// Compute the identity of `desc`.
///
/// Fails with `MalformedDescriptor` when the descriptor does not validate.
pub fn fingerprint(desc: &SampleDescriptor) -> Result<Fingerprint> {
    desc.validate()?;
    let doc = canonical_document(desc);
    let digest = Sha256::digest(doc.to_string().as_bytes());
    Ok(Fingerprint(hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DatasetRef, OutputFormat, QueryValue};
    use proptest::prelude::*;
    use serde_json::json;

    fn sample(name: &str) -> SampleDescriptor {
        SampleDescriptor::new(
            name,
            DatasetRef::did("user.x:data.1"),
            QueryValue::text("Select(lambda e: e.Jets())"),
            "atlasr22",
        )
    }

    #[test]
    fn test_name_and_bypass_do_not_matter() {
        let a = fingerprint(&sample("a")).unwrap();
        let b = fingerprint(&sample("b").ignoring_cache()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_each_semantic_field_matters() {
        let base = fingerprint(&sample("a")).unwrap();
        let variants = [
            SampleDescriptor { dataset: DatasetRef::did("user.x:data.2"), ..sample("a") },
            SampleDescriptor { query: QueryValue::text("Select(lambda e: e.Muons())"), ..sample("a") },
            sample("a").with_format(OutputFormat::RootFile),
            SampleDescriptor { codegen: "uproot".into(), ..sample("a") },
            sample("a").with_file_limit(3),
            sample("a").with_tree_name("CollectionTree"),
            SampleDescriptor {
                query: QueryValue::PythonFunction("Select(lambda e: e.Jets())".into()),
                ..sample("a")
            },
        ];
        for v in variants {
            assert_ne!(fingerprint(&v).unwrap(), base, "{v:?}");
        }
    }

    #[test]
    fn test_malformed_descriptor() {
        let bad = SampleDescriptor { codegen: "".into(), ..sample("a") };
        assert!(fingerprint(&bad).is_err());
        let bad = SampleDescriptor { query: QueryValue::text(""), ..sample("a") };
        assert!(fingerprint(&bad).is_err());
    }

    #[test]
    fn test_structured_key_order() {
        let a = SampleDescriptor {
            query: QueryValue::Structured(json!({"treename": "t", "filter_name": ["a", "b"]})),
            ..sample("a")
        };
        let b = SampleDescriptor {
            query: QueryValue::Structured(json!({"filter_name": ["a", "b"], "treename": "t"})),
            ..sample("b")
        };
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    proptest! {
        #[test]
        fn prop_key_order_never_changes_fingerprint(
            entries in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 1..8),
            name_a in "[a-z]{1,10}",
            name_b in "[a-z]{1,10}",
        ) {
            let forward: serde_json::Map<String, Value> =
                entries.iter().map(|(k, v)| (k.clone(), Value::from(v.clone()))).collect();
            let reversed: serde_json::Map<String, Value> =
                entries.iter().rev().map(|(k, v)| (k.clone(), Value::from(v.clone()))).collect();

            let a = SampleDescriptor { query: QueryValue::Structured(Value::Object(forward)), ..sample(&name_a) };
            let b = SampleDescriptor { query: QueryValue::Structured(Value::Object(reversed)), ..sample(&name_b) };
            prop_assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        }

        #[test]
        fn prop_distinct_text_queries_differ(a in "[A-Za-z]{1,16}", b in "[A-Za-z]{1,16}") {
            prop_assume!(a != b);
            let fa = fingerprint(&SampleDescriptor { query: QueryValue::text(a), ..sample("s") }).unwrap();
            let fb = fingerprint(&SampleDescriptor { query: QueryValue::text(b), ..sample("s") }).unwrap();
            prop_assert_ne!(fa, fb);
        }
    }
}
