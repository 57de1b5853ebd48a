//! Boundaries to the upstream registry.
//!
//! [`RegistryProjects`] is the identity/project API used to issue scoped robot
//! accounts; [`ArtifactRegistry`] is the OCI distribution endpoint state
//! artifacts are pushed to. Neither retries: a failed call is surfaced to the
//! caller, which rolls back its transaction.

mod harbor;
mod memory;
mod oci;

pub use harbor::HarborClient;
pub use memory::{MemoryProjects, MemoryRegistry};
pub use oci::OciClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One permission entry of a robot account, scoped to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotPermission {
    pub kind: String,
    pub namespace: String,
    pub access: Vec<RobotAccess>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotAccess {
    pub resource: String,
    pub action: String,
}

/// Robot account as the upstream API returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Robot {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub disable: bool,
    #[serde(default)]
    pub permissions: Vec<RobotPermission>,
}

impl Robot {
    /// Projects the robot currently has access to.
    #[must_use]
    pub fn projects(&self) -> Vec<String> {
        self.permissions
            .iter()
            .map(|p| p.namespace.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RobotRequest {
    pub name: String,
    pub description: String,
    pub level: String,
    /// -1 never expires.
    pub duration: i64,
    pub disable: bool,
    pub permissions: Vec<RobotPermission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RobotCreated {
    pub id: i64,
    pub name: String,
    pub secret: String,
}

/// Pull-only permissions on each of `projects`.
#[must_use]
pub fn robot_permissions(projects: &[String]) -> Vec<RobotPermission> {
    projects
        .iter()
        .map(|project| RobotPermission {
            kind: "project".to_string(),
            namespace: project.clone(),
            access: [("repository", "pull"), ("repository", "list"), ("artifact", "read")]
                .into_iter()
                .map(|(resource, action)| RobotAccess {
                    resource: resource.to_string(),
                    action: action.to_string(),
                })
                .collect(),
        })
        .collect()
}

#[async_trait]
pub trait RegistryProjects: Send + Sync {
    async fn create_robot(&self, request: &RobotRequest) -> Result<RobotCreated>;
    async fn get_robot(&self, robot_id: i64) -> Result<Robot>;
    async fn update_robot(&self, robot: &Robot) -> Result<()>;
    /// Deleting an already absent robot succeeds.
    async fn delete_robot(&self, robot_id: i64) -> Result<()>;
    async fn project_exists(&self, name: &str) -> Result<bool>;
    async fn create_project(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    /// Whether `repository` accepts pushes with the configured credentials.
    async fn probe(&self, repository: &str) -> Result<bool>;
    async fn blob_exists(&self, repository: &str, digest: &str) -> Result<bool>;
    async fn push_blob(&self, repository: &str, digest: &str, data: Vec<u8>) -> Result<()>;
    /// Stores `body` under `reference`, which is either a tag or a digest.
    async fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        body: Vec<u8>,
    ) -> Result<()>;
}

/// Classifies a transport failure, keeping URLs (and any credentials in them) out of the message.
pub(crate) fn transport_error(
    err: reqwest::Error,
    what: &str,
    wrap: fn(String) -> Error,
) -> Error {
    if err.is_timeout() {
        Error::Timeout(what.to_string())
    } else {
        wrap(format!("{what}: {}", err.without_url()))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Turns a non-success response into an error carrying the status and the
/// first upstream error entry, if any.
pub(crate) async fn status_error(
    resp: reqwest::Response,
    what: &str,
    wrap: fn(String) -> Error,
) -> Error {
    let status = resp.status();
    let detail = resp
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.errors.into_iter().next())
        .map(|e| format!(" ({} {})", e.code, e.message))
        .unwrap_or_default();
    wrap(format!("{what}: upstream returned {status}{detail}"))
}
