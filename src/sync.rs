//! Sync Orchestrator: composes membership writes, credential reconciliation
//! and state publication into one transaction per request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::credentials::{CredentialIssuer, RobotGrant};
use crate::error::{Error, Result};
use crate::state::{PublishReceipt, Publisher, StateDocument};
use crate::store::{SqliteStore, Store, StoreTx};
use crate::types::{Group, ImageRef, Satellite, project_names};

/// Desired image set for one group.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSync {
    pub group: String,
    #[serde(default)]
    pub images: Vec<DeclaredImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeclaredImage {
    pub registry: String,
    pub repository: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub deleted: bool,
}

impl From<DeclaredImage> for ImageRef {
    fn from(image: DeclaredImage) -> Self {
        ImageRef {
            registry: image.registry,
            repository: image.repository,
            tag: image.tag,
            digest: image.digest,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub name: String,
    pub projects: Vec<String>,
    pub artifact: PublishReceipt,
}

pub struct Orchestrator {
    store: SqliteStore,
    issuer: Arc<CredentialIssuer>,
    publisher: Arc<Publisher>,
    registry_host: String,
}

impl Orchestrator {
    pub fn new(
        store: SqliteStore,
        issuer: Arc<CredentialIssuer>,
        publisher: Arc<Publisher>,
        registry_host: impl Into<String>,
    ) -> Self {
        Self {
            store,
            issuer,
            publisher,
            registry_host: registry_host.into(),
        }
    }

    #[must_use]
    pub fn registry_host(&self) -> &str {
        &self.registry_host
    }

    /// Replaces the group's image set with the declared one, reconciles every
    /// member satellite and publishes the group's state. Nothing is committed
    /// unless the artifact was published.
    pub async fn sync_group(&self, request: GroupSync) -> Result<SyncOutcome> {
        let images: Vec<ImageRef> = request
            .images
            .into_iter()
            .filter(|image| !image.deleted)
            .map(ImageRef::from)
            .collect();
        for image in &images {
            image.validate()?;
        }
        let projects = project_names(&images);

        let tx = self.store.begin().await?;
        let group = tx.upsert_group(&request.group, &self.registry_host)?;
        let mut image_ids = Vec::with_capacity(images.len());
        for image in &images {
            image_ids.push(tx.upsert_image(image)?.id);
        }
        tx.set_group_images(group.id, &image_ids)?;

        let grants = self.issuer.plan_group_members(&tx, group.id)?;
        self.issuer.apply(&grants).await?;
        touch_robots(&tx, &grants)?;
        self.issuer.ensure_namespace().await?;

        let document = group_document(&tx, &group)?;
        let artifact = self.publisher.publish(&document).await?;
        tx.commit()?;

        tracing::info!(
            "Synced group {} with {} image(s) across project(s) [{}]",
            group.name,
            images.len(),
            projects.join(", ")
        );
        Ok(SyncOutcome {
            name: group.name,
            projects,
            artifact,
        })
    }

    /// Publishes the satellite-scoped artifact: its group names plus the
    /// images reachable through its labels.
    ///
    /// The robot's permissions still come from group images only, so label
    /// images in other projects need pull access granted outside groundctl.
    /// `SyncOutcome::projects` lists the projects the artifact refers to.
    pub async fn sync_satellite(&self, name: &str) -> Result<SyncOutcome> {
        let tx = self.store.begin().await?;
        let satellite = find_satellite(&tx, name)?;
        let groups: Vec<String> = tx
            .list_satellite_groups(satellite.id)?
            .into_iter()
            .map(|g| g.name)
            .collect();
        let images: Vec<ImageRef> = tx
            .list_satellite_label_images(satellite.id)?
            .iter()
            .map(|i| i.to_ref())
            .collect();

        let grant = self.issuer.plan_satellite(&tx, satellite.id)?;
        self.issuer.apply(grant.as_slice()).await?;
        touch_robots(&tx, grant.as_slice())?;
        self.issuer.ensure_namespace().await?;

        let projects = project_names(&images);
        let document = StateDocument::satellite(&satellite.name, &self.registry_host, groups, images);
        let artifact = self.publisher.publish(&document).await?;
        tx.commit()?;

        tracing::info!("Synced satellite {}", satellite.name);
        Ok(SyncOutcome {
            name: satellite.name,
            projects,
            artifact,
        })
    }

    /// Adds the satellite to the group and widens its robot's permissions.
    /// Returns false when it was already a member.
    pub async fn join_group(&self, satellite: &str, group: &str) -> Result<bool> {
        let tx = self.store.begin().await?;
        let satellite = find_satellite(&tx, satellite)?;
        let group = find_group(&tx, group)?;

        let added = tx.add_satellite_to_group(satellite.id, group.id)?;
        if added {
            let grant = self.issuer.plan_satellite(&tx, satellite.id)?;
            self.issuer.apply(grant.as_slice()).await?;
            touch_robots(&tx, grant.as_slice())?;
            tracing::info!("Added satellite {} to group {}", satellite.name, group.name);
        }
        tx.commit()?;
        Ok(added)
    }

    /// Removes the satellite from the group and narrows its robot's permissions.
    pub async fn leave_group(&self, satellite: &str, group: &str) -> Result<bool> {
        let tx = self.store.begin().await?;
        let satellite = find_satellite(&tx, satellite)?;
        let group = find_group(&tx, group)?;

        let removed = tx.remove_satellite_from_group(satellite.id, group.id)?;
        if removed {
            let grant = self.issuer.plan_satellite(&tx, satellite.id)?;
            self.issuer.apply(grant.as_slice()).await?;
            touch_robots(&tx, grant.as_slice())?;
            tracing::info!("Removed satellite {} from group {}", satellite.name, group.name);
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Assigns one image to the group. Members are reconciled so they can
    /// pull from the image's project; the group's artifact is published on
    /// the next sync.
    pub async fn assign_image(&self, group: &str, image: &ImageRef) -> Result<bool> {
        let tx = self.store.begin().await?;
        let group = find_group(&tx, group)?;
        let image = tx.upsert_image(image)?;

        let added = tx.add_group_image(group.id, image.id)?;
        if added {
            let grants = self.issuer.plan_group_members(&tx, group.id)?;
            self.issuer.apply(&grants).await?;
            touch_robots(&tx, &grants)?;
        }
        tx.commit()?;
        Ok(added)
    }

    pub async fn unassign_image(&self, group: &str, image: &ImageRef) -> Result<bool> {
        let tx = self.store.begin().await?;
        let group = find_group(&tx, group)?;
        let found = tx.find_image(image)?;
        let Some(image) = found else {
            return Ok(false);
        };

        let removed = tx.remove_group_image(group.id, image.id)?;
        if removed {
            let grants = self.issuer.plan_group_members(&tx, group.id)?;
            self.issuer.apply(&grants).await?;
            touch_robots(&tx, &grants)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Deletes the group and narrows the permissions of its former members.
    pub async fn delete_group(&self, name: &str) -> Result<()> {
        let tx = self.store.begin().await?;
        let group = find_group(&tx, name)?;
        let members = tx.list_group_satellites(group.id)?;

        tx.delete_group(group.id)?;
        let mut grants = Vec::new();
        for member in &members {
            grants.extend(self.issuer.plan_satellite(&tx, member.id)?);
        }
        self.issuer.apply(&grants).await?;
        touch_robots(&tx, &grants)?;
        tx.commit()?;

        tracing::info!("Deleted group {name}");
        Ok(())
    }
}

fn find_satellite(tx: &StoreTx, name: &str) -> Result<Satellite> {
    tx.get_satellite_by_name(name)?
        .ok_or_else(|| Error::not_found(format!("Satellite '{name}'")))
}

fn find_group(tx: &StoreTx, name: &str) -> Result<Group> {
    tx.get_group_by_name(name)?
        .ok_or_else(|| Error::not_found(format!("Group '{name}'")))
}

fn group_document(tx: &StoreTx, group: &Group) -> Result<StateDocument> {
    let images = tx
        .list_group_images(group.id)?
        .iter()
        .map(|i| i.to_ref())
        .collect();
    Ok(StateDocument::group(&group.name, &group.registry_url, images))
}

fn touch_robots(tx: &StoreTx, grants: &[RobotGrant]) -> Result<()> {
    for grant in grants {
        tx.touch_robot_account(grant.robot_id)?;
    }
    Ok(())
}
