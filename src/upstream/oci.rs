use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};

use super::{ArtifactRegistry, status_error, transport_error};
use crate::config::RegistryConfig;
use crate::error::{Error, Result};

/// OCI distribution API client used to push state artifacts.
pub struct OciClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl OciClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build registry client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Upload locations may be relative to the registry root.
    fn absolute(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}{location}", self.base_url)
        }
    }
}

/// Interprets the probe status. `None` leaves the response to the generic
/// status error.
///
/// A missing leaf repository is fine; it is created by the first push. 403 is
/// a namespace refusal, 401 means the credentials were not accepted.
fn probe_outcome(status: StatusCode, challenge: Option<&str>) -> Option<Result<bool>> {
    match status {
        status if status.is_success() => Some(Ok(true)),
        StatusCode::NOT_FOUND => Some(Ok(true)),
        StatusCode::FORBIDDEN => Some(Ok(false)),
        StatusCode::UNAUTHORIZED => {
            let message = match challenge {
                Some(c) if c.trim_start().to_ascii_lowercase().starts_with("bearer") => {
                    "registry requires bearer token authentication, which is not supported; \
                     use a registry that accepts basic auth for pushes"
                }
                _ => "registry rejected the configured push credentials",
            };
            Some(Err(Error::Publish(message.to_string())))
        }
        _ => None,
    }
}

#[async_trait]
impl ArtifactRegistry for OciClient {
    async fn probe(&self, repository: &str) -> Result<bool> {
        let what = "probing state repository";
        let resp = self
            .request(
                reqwest::Method::HEAD,
                &format!("{}/v2/{repository}/manifests/latest", self.base_url),
            )
            .header(header::ACCEPT, "application/vnd.oci.image.manifest.v1+json")
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Publish))?;

        let challenge = resp
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        match probe_outcome(resp.status(), challenge.as_deref()) {
            Some(outcome) => outcome,
            None => Err(status_error(resp, what, Error::Publish).await),
        }
    }

    async fn blob_exists(&self, repository: &str, digest: &str) -> Result<bool> {
        let what = "checking blob";
        let resp = self
            .request(
                reqwest::Method::HEAD,
                &format!("{}/v2/{repository}/blobs/{digest}", self.base_url),
            )
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Publish))?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(resp, what, Error::Publish).await),
        }
    }

    async fn push_blob(&self, repository: &str, digest: &str, data: Vec<u8>) -> Result<()> {
        let what = "starting blob upload";
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("{}/v2/{repository}/blobs/uploads/", self.base_url),
            )
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Publish))?;

        if resp.status() != StatusCode::ACCEPTED {
            return Err(status_error(resp, what, Error::Publish).await);
        }

        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Publish("upload session without a location".to_string()))?;
        let separator = if location.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}digest={digest}", self.absolute(location));

        let what = "uploading blob";
        let resp = self
            .request(reqwest::Method::PUT, &url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Publish))?;

        if !resp.status().is_success() {
            return Err(status_error(resp, what, Error::Publish).await);
        }
        Ok(())
    }

    async fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        body: Vec<u8>,
    ) -> Result<()> {
        let what = "pushing manifest";
        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("{}/v2/{repository}/manifests/{reference}", self.base_url),
            )
            .header(header::CONTENT_TYPE, media_type)
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Publish))?;

        if !resp.status().is_success() {
            return Err(status_error(resp, what, Error::Publish).await);
        }
        Ok(())
    }
}
