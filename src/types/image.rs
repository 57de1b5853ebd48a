use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reference to an image as carried in state artifacts.
///
/// At least one of `tag` and `digest` is non-empty; an empty digest is
/// omitted from the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
}

impl ImageRef {
    pub fn validate(&self) -> Result<()> {
        if self.registry.is_empty() || self.repository.is_empty() {
            return Err(Error::Validation(
                "image reference needs a registry and a repository".to_string(),
            ));
        }
        if self.tag.is_empty() && self.digest.is_empty() {
            return Err(Error::Validation(format!(
                "image {}/{} needs a tag or a digest",
                self.registry, self.repository
            )));
        }
        Ok(())
    }

    /// Upstream project that owns the repository (its first path segment).
    #[must_use]
    pub fn project(&self) -> &str {
        self.repository
            .split('/')
            .next()
            .unwrap_or(self.repository.as_str())
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if !self.tag.is_empty() {
            write!(f, ":{}", self.tag)?;
        }
        if !self.digest.is_empty() {
            write!(f, "@{}", self.digest)?;
        }
        Ok(())
    }
}

/// Parses `[scheme://]registry/repository[:tag][@digest]`.
pub fn parse_artifact_url(raw: &str) -> Result<ImageRef> {
    let raw = raw.trim();
    let without_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);

    let (registry, path) = without_scheme
        .split_once('/')
        .ok_or_else(|| Error::Validation(format!("missing repository in artifact URL: {raw}")))?;

    let (name, digest) = match path.split_once('@') {
        Some((name, digest)) => (name, digest),
        None => (path, ""),
    };

    // A colon in the last path segment separates the tag.
    let (repository, tag) = match name.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (name, ""),
    };

    let image = ImageRef {
        registry: registry.to_string(),
        repository: repository.trim_matches('/').to_string(),
        tag: tag.to_string(),
        digest: digest.to_string(),
    };

    if image.registry.is_empty() || image.repository.is_empty() {
        return Err(Error::Validation(format!(
            "missing repository or registry in artifact URL: {raw}"
        )));
    }
    if image.tag.is_empty() && image.digest.is_empty() {
        return Err(Error::Validation(format!(
            "missing tag or digest in artifact URL: {raw}"
        )));
    }

    Ok(image)
}

/// Unique upstream projects of `images`, in first-seen order.
#[must_use]
pub fn project_names<'a, I>(images: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ImageRef>,
{
    let mut projects: Vec<String> = Vec::new();
    for image in images {
        let project = image.project();
        if !projects.iter().any(|p| p == project) {
            projects.push(project.to_string());
        }
    }
    projects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let image = parse_artifact_url("reg.example.com/app/web:v1").unwrap();
        assert_eq!(image.registry, "reg.example.com");
        assert_eq!(image.repository, "app/web");
        assert_eq!(image.tag, "v1");
        assert_eq!(image.digest, "");
    }

    #[test]
    fn test_parse_digest_with_scheme() {
        let image =
            parse_artifact_url("https://reg.example.com/library/alpine@sha256:abcd").unwrap();
        assert_eq!(image.registry, "reg.example.com");
        assert_eq!(image.repository, "library/alpine");
        assert_eq!(image.tag, "");
        assert_eq!(image.digest, "sha256:abcd");
    }

    #[test]
    fn test_parse_registry_port_and_tag_digest() {
        let image = parse_artifact_url("localhost:5000/app/api:1.2@sha256:ff").unwrap();
        assert_eq!(image.registry, "localhost:5000");
        assert_eq!(image.repository, "app/api");
        assert_eq!(image.tag, "1.2");
        assert_eq!(image.digest, "sha256:ff");
    }

    #[test]
    fn test_parse_rejects_missing_reference() {
        assert!(matches!(
            parse_artifact_url("reg.example.com/app/web"),
            Err(Error::Validation(_))
        ));
        assert!(parse_artifact_url("reg.example.com").is_err());
        assert!(parse_artifact_url("reg.example.com/:v1").is_err());
    }

    #[test]
    fn test_display_reparses_to_same_reference() {
        let inputs = [
            "reg.example.com/app/web:v1",
            "reg.example.com/app/web@sha256:0123",
            "localhost:5000/team/svc/api:2.0@sha256:beef",
            "https://reg.example.com/library/nginx:latest",
        ];
        for input in inputs {
            let parsed = parse_artifact_url(input).unwrap();
            let reparsed = parse_artifact_url(&parsed.to_string()).unwrap();
            assert_eq!(parsed, reparsed, "{input}");
        }
    }

    #[test]
    fn test_project_names_unique_in_order() {
        let images = [
            parse_artifact_url("r/app/web:v1").unwrap(),
            parse_artifact_url("r/lib/db:v1").unwrap(),
            parse_artifact_url("r/app/api:v2").unwrap(),
        ];
        assert_eq!(project_names(&images), vec!["app", "lib"]);
    }

    #[test]
    fn test_digest_omitted_when_empty() {
        let image = parse_artifact_url("r/app/web:v1").unwrap();
        let json = serde_json::to_string(&image).unwrap();
        assert_eq!(json, r#"{"registry":"r","repository":"app/web","tag":"v1"}"#);
    }
}
