//! Credential Issuer: the only component that mutates robot accounts on the
//! upstream registry.

use std::sync::Arc;

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{ImageRef, project_names};
use crate::upstream::{RegistryProjects, RobotCreated, RobotRequest, robot_permissions};

const ROBOT_LEVEL: &str = "system";
const NEVER_EXPIRES: i64 = -1;

pub struct CredentialIssuer {
    projects: Arc<dyn RegistryProjects>,
    state_namespace: String,
}

impl CredentialIssuer {
    pub fn new(projects: Arc<dyn RegistryProjects>, state_namespace: impl Into<String>) -> Self {
        Self {
            projects,
            state_namespace: state_namespace.into(),
        }
    }

    #[must_use]
    pub fn state_namespace(&self) -> &str {
        &self.state_namespace
    }

    /// Creates a robot account for `satellite_name` restricted to `projects`.
    pub async fn provision(&self, satellite_name: &str, projects: &[String]) -> Result<RobotCreated> {
        if projects.is_empty() {
            return Err(Error::Validation(
                "a robot account needs at least one project".to_string(),
            ));
        }

        let request = RobotRequest {
            name: satellite_name.to_string(),
            description: format!("groundctl satellite {satellite_name}"),
            level: ROBOT_LEVEL.to_string(),
            duration: NEVER_EXPIRES,
            disable: false,
            permissions: robot_permissions(projects),
        };

        let robot = self.projects.create_robot(&request).await?;
        tracing::info!(
            "Provisioned robot account {} for satellite {satellite_name}",
            robot.name
        );
        Ok(robot)
    }

    /// Replaces the robot's permission set with one derived from `projects`.
    pub async fn reconcile_permissions(&self, robot_id: i64, projects: &[String]) -> Result<()> {
        if projects.is_empty() {
            return Err(Error::Validation(
                "a robot account needs at least one project".to_string(),
            ));
        }

        let mut robot = self.projects.get_robot(robot_id).await?;
        robot.permissions = robot_permissions(projects);
        self.projects.update_robot(&robot).await?;

        tracing::debug!(
            "Reconciled robot {} to projects [{}]",
            robot.name,
            projects.join(", ")
        );
        Ok(())
    }

    pub async fn revoke(&self, robot_id: i64) -> Result<()> {
        self.projects.delete_robot(robot_id).await?;
        tracing::info!("Revoked robot account {robot_id}");
        Ok(())
    }

    /// Creates the shared state namespace upstream when it does not exist yet.
    pub async fn ensure_namespace(&self) -> Result<()> {
        if !self.projects.project_exists(&self.state_namespace).await? {
            self.projects.create_project(&self.state_namespace).await?;
            tracing::info!("Created state namespace {}", self.state_namespace);
        }
        Ok(())
    }

    /// Permission set for a satellite: the state namespace plus the projects
    /// of every image of every group it belongs to.
    pub fn projects_for_satellite(&self, conn: &Connection, satellite_id: i64) -> Result<Vec<String>> {
        let mut images: Vec<ImageRef> = Vec::new();
        for group in conn.list_satellite_groups(satellite_id)? {
            images.extend(conn.list_group_images(group.id)?.iter().map(|i| i.to_ref()));
        }
        Ok(self.with_namespace(project_names(&images)))
    }

    fn with_namespace(&self, projects: Vec<String>) -> Vec<String> {
        let mut all = vec![self.state_namespace.clone()];
        all.extend(projects.into_iter().filter(|p| *p != self.state_namespace));
        all
    }

    /// Permission sets every member of the group should hold after a change.
    pub fn plan_group_members(&self, conn: &Connection, group_id: i64) -> Result<Vec<RobotGrant>> {
        let mut grants = Vec::new();
        for satellite in conn.list_group_satellites(group_id)? {
            grants.extend(self.plan_satellite(conn, satellite.id)?);
        }
        Ok(grants)
    }

    /// `None` for a satellite that has no robot account yet.
    pub fn plan_satellite(&self, conn: &Connection, satellite_id: i64) -> Result<Option<RobotGrant>> {
        let Some(robot) = conn.get_robot_account_by_satellite(satellite_id)? else {
            tracing::debug!("Satellite {satellite_id} has no robot account yet");
            return Ok(None);
        };

        Ok(Some(RobotGrant {
            robot_id: robot.robot_id,
            projects: self.projects_for_satellite(conn, satellite_id)?,
        }))
    }

    /// Pushes each grant upstream, stopping at the first failure.
    pub async fn apply(&self, grants: &[RobotGrant]) -> Result<()> {
        for grant in grants {
            self.reconcile_permissions(grant.robot_id, &grant.projects).await?;
        }
        Ok(())
    }
}

/// Desired permission set for one robot account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotGrant {
    pub robot_id: i64,
    pub projects: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{RobotAccount, parse_artifact_url};
    use crate::upstream::MemoryProjects;

    fn issuer() -> (Arc<MemoryProjects>, CredentialIssuer) {
        let upstream = Arc::new(MemoryProjects::default());
        let issuer = CredentialIssuer::new(upstream.clone(), "satellite");
        (upstream, issuer)
    }

    #[tokio::test]
    async fn test_provision_rejects_empty_projects() {
        let (_, issuer) = issuer();
        let result = issuer.provision("sat1", &[]).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_provision_scopes_to_projects() {
        let (upstream, issuer) = issuer();
        let robot = issuer
            .provision("sat1", &["satellite".to_string(), "app".to_string()])
            .await
            .unwrap();

        assert_eq!(robot.name, "robot$sat1");
        let stored = upstream.robot(robot.id).unwrap();
        assert_eq!(stored.projects(), vec!["satellite", "app"]);
    }

    #[tokio::test]
    async fn test_reconcile_replaces_permissions() {
        let (upstream, issuer) = issuer();
        let robot = issuer
            .provision("sat1", &["satellite".to_string(), "old".to_string()])
            .await
            .unwrap();

        issuer
            .reconcile_permissions(robot.id, &["satellite".to_string(), "new".to_string()])
            .await
            .unwrap();

        let stored = upstream.robot(robot.id).unwrap();
        assert_eq!(stored.projects(), vec!["satellite", "new"]);
    }

    #[tokio::test]
    async fn test_ensure_namespace_creates_once() {
        let (upstream, issuer) = issuer();
        issuer.ensure_namespace().await.unwrap();
        issuer.ensure_namespace().await.unwrap();
        assert_eq!(upstream.projects(), vec!["satellite"]);
    }

    #[tokio::test]
    async fn test_projects_for_satellite_unions_groups() {
        let (_, issuer) = issuer();
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().await.unwrap();
        let conn = store.connection().await.unwrap();

        let sat = conn.create_satellite("sat1", "lookup01", "hash", None).unwrap();
        let g1 = conn.create_group("g1", "reg.example.com").unwrap();
        let g2 = conn.create_group("g2", "reg.example.com").unwrap();
        for (group, url) in [
            (g1.id, "reg.example.com/app/web:v1"),
            (g1.id, "reg.example.com/lib/db:v1"),
            (g2.id, "reg.example.com/app/api:v2"),
        ] {
            let image = conn.upsert_image(&parse_artifact_url(url).unwrap()).unwrap();
            conn.add_group_image(group, image.id).unwrap();
        }
        conn.add_satellite_to_group(sat.id, g1.id).unwrap();
        conn.add_satellite_to_group(sat.id, g2.id).unwrap();

        let projects = issuer.projects_for_satellite(&conn, sat.id).unwrap();
        assert_eq!(projects, vec!["satellite", "app", "lib"]);
    }

    #[tokio::test]
    async fn test_reconcile_satellite_follows_membership() {
        let (upstream, issuer) = issuer();
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().await.unwrap();
        let conn = store.connection().await.unwrap();

        let sat = conn.create_satellite("sat1", "lookup01", "hash", None).unwrap();
        let robot = issuer.provision("sat1", &["satellite".to_string()]).await.unwrap();
        let now = chrono::Utc::now();
        conn.create_robot_account(&RobotAccount {
            robot_id: robot.id,
            robot_name: robot.name.clone(),
            robot_secret: robot.secret.clone(),
            satellite_id: sat.id,
            created_at: now,
            updated_at: now,
        })
        .unwrap();

        let group = conn.create_group("g1", "reg.example.com").unwrap();
        let image = conn
            .upsert_image(&parse_artifact_url("reg.example.com/app/web:v1").unwrap())
            .unwrap();
        conn.add_group_image(group.id, image.id).unwrap();
        conn.add_satellite_to_group(sat.id, group.id).unwrap();

        let grants = issuer.plan_group_members(&conn, group.id).unwrap();
        assert_eq!(grants.len(), 1);
        issuer.apply(&grants).await.unwrap();
        let stored = upstream.robot(robot.id).unwrap();
        assert_eq!(stored.projects(), vec!["satellite", "app"]);
    }
}
