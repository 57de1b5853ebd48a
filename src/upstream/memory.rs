//! In-memory upstream registry, used to run the control plane without a
//! registry and as the test fixture for every workflow.
//!
//! Failure switches make subsequent calls fail the way an unreachable or
//! rejecting upstream would.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{ArtifactRegistry, RegistryProjects, Robot, RobotCreated, RobotRequest};
use crate::error::{Error, Result};
use crate::state::digest_of;

#[derive(Default)]
pub struct MemoryProjects {
    robots: Mutex<Vec<Robot>>,
    projects: Mutex<Vec<String>>,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
}

impl MemoryProjects {
    pub fn robot(&self, id: i64) -> Option<Robot> {
        lock(&self.robots).iter().find(|r| r.id == id).cloned()
    }

    pub fn robot_by_name(&self, name: &str) -> Option<Robot> {
        lock(&self.robots).iter().find(|r| r.name == name).cloned()
    }

    pub fn robots(&self) -> Vec<Robot> {
        lock(&self.robots).clone()
    }

    pub fn robot_count(&self) -> usize {
        lock(&self.robots).len()
    }

    pub fn projects(&self) -> Vec<String> {
        lock(&self.projects).clone()
    }

    pub fn has_project(&self, name: &str) -> bool {
        lock(&self.projects).iter().any(|p| p == name)
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RegistryProjects for MemoryProjects {
    async fn create_robot(&self, request: &RobotRequest) -> Result<RobotCreated> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Upstream("robot creation rejected".to_string()));
        }
        let mut robots = lock(&self.robots);
        let name = format!("robot${}", request.name);
        if robots.iter().any(|r| r.name == name) {
            return Err(Error::Upstream(format!("robot {name} already exists")));
        }
        let id = robots.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        robots.push(Robot {
            id,
            name: name.clone(),
            description: request.description.clone(),
            level: request.level.clone(),
            duration: request.duration,
            disable: request.disable,
            permissions: request.permissions.clone(),
        });
        Ok(RobotCreated {
            id,
            name,
            secret: format!("secret-{id}"),
        })
    }

    async fn get_robot(&self, robot_id: i64) -> Result<Robot> {
        self.robot(robot_id)
            .ok_or_else(|| Error::Upstream(format!("robot {robot_id} not found")))
    }

    async fn update_robot(&self, robot: &Robot) -> Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Error::Upstream("robot update rejected".to_string()));
        }
        let mut robots = lock(&self.robots);
        match robots.iter_mut().find(|r| r.id == robot.id) {
            Some(existing) => {
                *existing = robot.clone();
                Ok(())
            }
            None => Err(Error::Upstream(format!("robot {} not found", robot.id))),
        }
    }

    async fn delete_robot(&self, robot_id: i64) -> Result<()> {
        lock(&self.robots).retain(|r| r.id != robot_id);
        Ok(())
    }

    async fn project_exists(&self, name: &str) -> Result<bool> {
        Ok(self.has_project(name))
    }

    async fn create_project(&self, name: &str) -> Result<()> {
        let mut projects = lock(&self.projects);
        if !projects.iter().any(|p| p == name) {
            projects.push(name.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRegistry {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    manifests: Mutex<HashMap<(String, String), Vec<u8>>>,
    blob_pushes: AtomicUsize,
    denied: AtomicBool,
    fail_push: AtomicBool,
    rejected_reference: Mutex<Option<fn(&str) -> bool>>,
    latency: Mutex<Duration>,
}

impl MemoryRegistry {
    pub fn manifest(&self, repository: &str, reference: &str) -> Option<Vec<u8>> {
        lock(&self.manifests)
            .get(&(repository.to_string(), reference.to_string()))
            .cloned()
    }

    /// Number of references (digests and tags) stored for `repository`.
    pub fn manifest_count(&self, repository: &str) -> usize {
        lock(&self.manifests)
            .keys()
            .filter(|(repo, _)| repo == repository)
            .count()
    }

    pub fn blob(&self, digest: &str) -> Option<Vec<u8>> {
        lock(&self.blobs).get(digest).cloned()
    }

    pub fn blob_count(&self) -> usize {
        lock(&self.blobs).len()
    }

    /// Blob uploads accepted so far.
    pub fn blob_pushes(&self) -> usize {
        self.blob_pushes.load(Ordering::SeqCst)
    }

    /// Tags of `repository`, sorted; digest references are left out.
    pub fn tags(&self, repository: &str) -> Vec<String> {
        let mut tags: Vec<String> = lock(&self.manifests)
            .keys()
            .filter(|(repo, reference)| repo == repository && !reference.starts_with("sha256:"))
            .map(|(_, reference)| reference.clone())
            .collect();
        tags.sort();
        tags
    }

    /// Makes `probe` report that no repository accepts pushes.
    pub fn deny(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    /// Fails every blob upload and manifest put.
    pub fn fail_pushes(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    /// Fails manifest puts whose reference matches `rejects`.
    pub fn reject_references(&self, rejects: fn(&str) -> bool) {
        *lock(&self.rejected_reference) = Some(rejects);
    }

    /// Makes every repository check take `delay`, standing in for a slow registry.
    pub fn set_latency(&self, delay: Duration) {
        *lock(&self.latency) = delay;
    }
}

#[async_trait]
impl ArtifactRegistry for MemoryRegistry {
    async fn probe(&self, _repository: &str) -> Result<bool> {
        let delay = *lock(&self.latency);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(!self.denied.load(Ordering::SeqCst))
    }

    async fn blob_exists(&self, _repository: &str, digest: &str) -> Result<bool> {
        Ok(lock(&self.blobs).contains_key(digest))
    }

    async fn push_blob(&self, _repository: &str, digest: &str, data: Vec<u8>) -> Result<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(Error::Publish("connection reset".to_string()));
        }
        if digest_of(&data) != digest {
            return Err(Error::Publish(format!("digest mismatch for {digest}")));
        }
        self.blob_pushes.fetch_add(1, Ordering::SeqCst);
        lock(&self.blobs).insert(digest.to_string(), data);
        Ok(())
    }

    async fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        _media_type: &str,
        body: Vec<u8>,
    ) -> Result<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(Error::Publish("connection reset".to_string()));
        }
        let rejected = *lock(&self.rejected_reference);
        if rejected.is_some_and(|rejects| rejects(reference)) {
            return Err(Error::Publish(format!("manifest {reference} rejected")));
        }
        lock(&self.manifests).insert((repository.to_string(), reference.to_string()), body);
        Ok(())
    }
}

/// Locks, ignoring poisoning.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
