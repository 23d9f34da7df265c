use serde::{Deserialize, Serialize};

use crate::SampleDescriptor;

/// The body submitted to the control plane for one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransformRequest {
    pub title:              String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did:                Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_list:          Option<Vec<String>>,
    pub selection:          String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree_name:          Option<String>,
    pub codegen:            String,
    pub result_format:      String,
    pub result_destination: String,
}

impl TransformRequest {
    pub fn from_descriptor(desc: &SampleDescriptor) -> Self {
        Self {
            title:              desc.name.clone(),
            did:                desc.dataset.render_did(desc.file_limit),
            file_list:          desc.dataset.file_list().map(<[String]>::to_vec),
            selection:          desc.query.selection(),
            tree_name:          desc.tree_name.clone(),
            codegen:            desc.codegen.trim().to_string(),
            result_format:      desc.format.as_str().to_string(),
            result_destination: "object-store".to_string(),
        }
    }
}
