use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const ARTIFACT_TYPE: &str = "application/vnd.test.artifact.v1+json";
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.test.file.v1+json";
pub const EMPTY_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.empty.v1+json";

/// Content of the empty config blob.
pub const EMPTY_CONFIG: &[u8] = b"{}";

const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// `sha256:<hex>` content address of `data`.
#[must_use]
pub fn digest_of(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    #[must_use]
    pub fn for_blob(media_type: &str, data: &[u8]) -> Self {
        Self {
            media_type: media_type.to_string(),
            digest: digest_of(data),
            size: data.len() as u64,
            annotations: BTreeMap::new(),
        }
    }
}

/// Single-layer OCI image manifest wrapping a state document.
///
/// Carries no timestamps so the same layer always yields the same manifest
/// digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub media_type: String,
    pub artifact_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    #[must_use]
    pub fn single_layer(layer: &[u8], title: &str) -> Self {
        let mut layer = Descriptor::for_blob(LAYER_MEDIA_TYPE, layer);
        layer
            .annotations
            .insert(TITLE_ANNOTATION.to_string(), title.to_string());

        Self {
            schema_version: 2,
            media_type: MANIFEST_MEDIA_TYPE.to_string(),
            artifact_type: ARTIFACT_TYPE.to_string(),
            config: Descriptor::for_blob(EMPTY_CONFIG_MEDIA_TYPE, EMPTY_CONFIG),
            layers: vec![layer],
        }
    }

    pub fn to_bytes(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_of_known_value() {
        assert_eq!(
            digest_of(b"123"),
            "sha256:a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3"
        );
    }

    #[test]
    fn test_single_layer_manifest() {
        let manifest = Manifest::single_layer(b"{\"name\":\"g1\"}", "state.json");
        assert_eq!(manifest.layers.len(), 1);
        assert_eq!(manifest.layers[0].media_type, LAYER_MEDIA_TYPE);
        assert_eq!(manifest.config.size, 2);

        let value: serde_json::Value = serde_json::from_slice(&manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(value["schemaVersion"], 2);
        assert_eq!(value["artifactType"], ARTIFACT_TYPE);
        assert_eq!(
            value["layers"][0]["annotations"][TITLE_ANNOTATION],
            "state.json"
        );
        assert!(value["config"].get("annotations").is_none());
    }

    #[test]
    fn test_manifest_digest_is_stable() {
        let a = Manifest::single_layer(b"same", "state.json").to_bytes().unwrap();
        let b = Manifest::single_layer(b"same", "state.json").to_bytes().unwrap();
        assert_eq!(digest_of(&a), digest_of(&b));

        let c = Manifest::single_layer(b"other", "state.json").to_bytes().unwrap();
        assert_ne!(digest_of(&a), digest_of(&c));
    }
}
