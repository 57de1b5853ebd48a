//! State artifacts: the JSON documents satellites pull to learn what to mirror,
//! and the machinery that packs and pushes them as OCI artifacts.

mod builder;
mod layout;
mod manifest;
mod publisher;

pub use builder::{StateDocument, build};
pub use layout::BlobStore;
pub use manifest::{
    ARTIFACT_TYPE, Descriptor, EMPTY_CONFIG_MEDIA_TYPE, LAYER_MEDIA_TYPE, MANIFEST_MEDIA_TYPE,
    Manifest, digest_of,
};
pub use publisher::{Publisher, PublishReceipt, artifact_repository, group_state_location};
