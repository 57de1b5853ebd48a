use std::sync::Arc;

use serde::Serialize;

use super::builder::{StateDocument, build};
use super::layout::BlobStore;
use super::manifest::{EMPTY_CONFIG, MANIFEST_MEDIA_TYPE, Manifest};
use crate::error::{Error, Result};
use crate::types::SubjectKind;
use crate::upstream::ArtifactRegistry;

const LATEST_TAG: &str = "latest";
const LAYER_TITLE: &str = "state.json";

/// Repository path of a subject's artifact, below the registry host.
#[must_use]
pub fn artifact_repository(namespace: &str, kind: SubjectKind, name: &str) -> String {
    format!("{namespace}/{}/{name}", kind.path_segment())
}

/// Location a satellite pulls to read a group's current state.
#[must_use]
pub fn group_state_location(registry: &str, namespace: &str, group: &str) -> String {
    format!(
        "{registry}/{}:{LATEST_TAG}",
        artifact_repository(namespace, SubjectKind::Group, group)
    )
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub reference: String,
    pub digest: String,
    pub tags: Vec<String>,
}

/// Packs state documents as single-layer OCI artifacts and pushes them.
pub struct Publisher {
    registry: Arc<dyn ArtifactRegistry>,
    namespace: String,
}

impl Publisher {
    pub fn new(registry: Arc<dyn ArtifactRegistry>, namespace: impl Into<String>) -> Self {
        Self {
            registry,
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Publishes `document` under `latest` and a Unix-timestamp tag.
    ///
    /// The manifest is stored by digest, then under the timestamp tag, and
    /// `latest` moves last. A failure before that leaves `latest` where it was;
    /// at most a new immutable timestamp tag remains.
    pub async fn publish(&self, document: &StateDocument) -> Result<PublishReceipt> {
        if document.name().is_empty() {
            return Err(Error::Validation("state subject needs a name".to_string()));
        }

        let payload = build(document)?;
        let blobs = BlobStore::new().await?;
        let config_digest = blobs.put(EMPTY_CONFIG).await?;
        let layer_digest = blobs.put(&payload).await?;

        let manifest = Manifest::single_layer(&payload, LAYER_TITLE).to_bytes()?;
        let manifest_digest = blobs.put(&manifest).await?;

        let repository = artifact_repository(&self.namespace, document.kind(), document.name());
        if !self.registry.probe(&repository).await? {
            return Err(Error::Publish(format!(
                "{repository} does not accept pushes; the '{}' project must be created on the registry first",
                self.namespace
            )));
        }

        for digest in [&config_digest, &layer_digest] {
            if self.registry.blob_exists(&repository, digest).await? {
                tracing::debug!("Blob {digest} already present in {repository}");
                continue;
            }
            let data = blobs.get(digest).await?;
            self.registry.push_blob(&repository, digest, data).await?;
        }

        let timestamp = chrono::Utc::now().timestamp().to_string();
        for reference in [manifest_digest.as_str(), timestamp.as_str(), LATEST_TAG] {
            self.registry
                .put_manifest(&repository, reference, MANIFEST_MEDIA_TYPE, manifest.clone())
                .await?;
        }

        let receipt = PublishReceipt {
            reference: format!("{}/{repository}:{LATEST_TAG}", document.registry()),
            digest: manifest_digest,
            tags: vec![LATEST_TAG.to_string(), timestamp],
        };
        tracing::info!("Published {} ({})", receipt.reference, receipt.digest);
        Ok(receipt)
    }
}
