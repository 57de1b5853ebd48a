use serde::Serialize;

use crate::error::Result;
use crate::types::{ImageRef, SubjectKind};

/// Document published for one subject.
///
/// Serialized without a tag; the field order of each variant is the wire
/// format satellites parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StateDocument {
    Group {
        name: String,
        registry: String,
        images: Vec<ImageRef>,
    },
    Satellite {
        name: String,
        groups: Vec<String>,
        registry: String,
        images: Vec<ImageRef>,
    },
}

impl StateDocument {
    /// Images are sorted and deduplicated so equal sets encode identically.
    pub fn group(name: impl Into<String>, registry: impl Into<String>, images: Vec<ImageRef>) -> Self {
        StateDocument::Group {
            name: name.into(),
            registry: registry.into(),
            images: normalize(images),
        }
    }

    pub fn satellite(
        name: impl Into<String>,
        registry: impl Into<String>,
        mut groups: Vec<String>,
        images: Vec<ImageRef>,
    ) -> Self {
        groups.sort();
        groups.dedup();
        StateDocument::Satellite {
            name: name.into(),
            groups,
            registry: registry.into(),
            images: normalize(images),
        }
    }

    #[must_use]
    pub fn kind(&self) -> SubjectKind {
        match self {
            StateDocument::Group { .. } => SubjectKind::Group,
            StateDocument::Satellite { .. } => SubjectKind::Satellite,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            StateDocument::Group { name, .. } | StateDocument::Satellite { name, .. } => name,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &str {
        match self {
            StateDocument::Group { registry, .. } | StateDocument::Satellite { registry, .. } => {
                registry
            }
        }
    }

    #[must_use]
    pub fn images(&self) -> &[ImageRef] {
        match self {
            StateDocument::Group { images, .. } | StateDocument::Satellite { images, .. } => images,
        }
    }
}

fn normalize(mut images: Vec<ImageRef>) -> Vec<ImageRef> {
    images.sort();
    images.dedup();
    images
}

/// Encodes the document. Equal documents always produce identical bytes.
pub fn build(document: &StateDocument) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(document)?)
}
