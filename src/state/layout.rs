use std::path::PathBuf;

use tempfile::TempDir;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::manifest::digest_of;
use crate::error::{Error, Result};

const LAYOUT_FILE: &str = "oci-layout";
const LAYOUT_VERSION: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

/// Content-addressed blob directory scoped to one publish.
///
/// Blobs live under `blobs/sha256/<hex>`. The directory is removed when the
/// store is dropped, whichever way the publish ends.
pub struct BlobStore {
    dir: TempDir,
}

impl BlobStore {
    pub async fn new() -> Result<Self> {
        let dir = TempDir::with_prefix("groundctl-state-")?;
        fs::create_dir_all(dir.path().join("blobs").join("sha256")).await?;
        fs::write(dir.path().join(LAYOUT_FILE), LAYOUT_VERSION).await?;
        Ok(Self { dir })
    }

    fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let hex = digest
            .strip_prefix("sha256:")
            .filter(|hex| is_valid_hex(hex))
            .ok_or_else(|| Error::Validation(format!("invalid blob digest: {digest}")))?;
        Ok(self.dir.path().join("blobs").join("sha256").join(hex))
    }

    /// Writes `data` and returns its digest.
    pub async fn put(&self, data: &[u8]) -> Result<String> {
        let digest = digest_of(data);
        let final_path = self.blob_path(&digest)?;
        if fs::try_exists(&final_path).await? {
            return Ok(digest);
        }

        let temp_path = self.dir.path().join(Uuid::new_v4().to_string());
        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;
        fs::rename(&temp_path, &final_path).await?;

        Ok(digest)
    }

    /// Reads a blob back, verifying its content address.
    pub async fn get(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(digest)?;
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(format!("Blob {digest}")));
            }
            Err(e) => return Err(e.into()),
        };

        let actual = digest_of(&data);
        if actual != digest {
            return Err(Error::Integrity(format!(
                "blob hash mismatch: expected {digest}, got {actual}"
            )));
        }
        Ok(data)
    }

    #[cfg(test)]
    fn root(&self) -> &std::path::Path {
        self.dir.path()
    }
}

fn is_valid_hex(hex: &str) -> bool {
    hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase())
}
