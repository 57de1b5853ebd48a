//! Satellite registration: intent creation, the zero-touch token exchange and
//! deletion.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::auth::{TokenGenerator, TokenKind, parse_token};
use crate::config::RegistryConfig;
use crate::credentials::CredentialIssuer;
use crate::error::{Error, Result};
use crate::state::group_state_location;
use crate::store::{SqliteStore, Store, StoreTx};
use crate::types::{RobotAccount, Satellite};

/// A newly registered satellite and the raw bootstrap token, shown once.
#[derive(Debug)]
pub struct Registration {
    pub satellite: Satellite,
    pub token: String,
}

/// Everything a satellite needs to start pulling its state.
#[derive(Debug, Clone, Serialize)]
pub struct Bootstrap {
    pub states: Vec<String>,
    pub auth: RobotCredential,
}

#[derive(Debug, Clone, Serialize)]
pub struct RobotCredential {
    pub name: String,
    pub secret: String,
    pub registry: String,
}

pub struct Registrar {
    store: SqliteStore,
    issuer: Arc<CredentialIssuer>,
    tokens: TokenGenerator,
    registry_url: String,
    token_ttl: Option<chrono::Duration>,
}

impl Registrar {
    pub fn new(
        store: SqliteStore,
        issuer: Arc<CredentialIssuer>,
        registry: &RegistryConfig,
        token_ttl: Option<chrono::Duration>,
    ) -> Self {
        Self {
            store,
            issuer,
            tokens: TokenGenerator::new(),
            registry_url: registry.base_url(),
            token_ttl,
        }
    }

    /// Creates the satellite row in the pending state, attaches it to `groups`
    /// and provisions its robot account.
    ///
    /// The robot account is revoked again if anything fails after it was
    /// created upstream.
    pub async fn register(&self, name: &str, groups: &[String]) -> Result<Registration> {
        let token = self.tokens.generate(TokenKind::Bootstrap)?;
        let expires_at = self.token_ttl.map(|ttl| Utc::now() + ttl);

        let tx = self.store.begin().await?;
        let satellite = tx.create_satellite(name, &token.lookup, &token.hash, expires_at)?;
        for group_name in groups {
            let group = tx
                .get_group_by_name(group_name)?
                .ok_or_else(|| Error::not_found(format!("Group '{group_name}'")))?;
            tx.add_satellite_to_group(satellite.id, group.id)?;
        }
        let projects = self.issuer.projects_for_satellite(&tx, satellite.id)?;

        self.issuer.ensure_namespace().await?;
        let robot = self.issuer.provision(name, &projects).await?;

        let now = Utc::now();
        let account = RobotAccount {
            robot_id: robot.id,
            robot_name: robot.name,
            robot_secret: robot.secret,
            satellite_id: satellite.id,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = store_robot(tx, &account) {
            tracing::warn!("Registration of {name} failed after provisioning: {e}");
            if let Err(revoke_err) = self.issuer.revoke(account.robot_id).await {
                tracing::error!(
                    "Failed to revoke robot account {} for {name}: {revoke_err}",
                    account.robot_id
                );
            }
            return Err(e);
        }

        tracing::info!("Registered satellite {name} in {} group(s)", groups.len());
        Ok(Registration {
            satellite,
            token: token.raw,
        })
    }

    /// Exchanges a bootstrap token for the satellite's robot credential and
    /// state locations. The token is consumed by the first success.
    pub async fn exchange(&self, raw_token: &str) -> Result<Bootstrap> {
        let lookup = parse_token(TokenKind::Bootstrap, raw_token).map_err(|_| invalid_token())?;

        let tx = self.store.begin().await?;
        let satellite = tx
            .get_satellite_by_token_lookup(&lookup)?
            .ok_or_else(invalid_token)?;
        let hash = satellite.token_hash.as_deref().ok_or_else(invalid_token)?;
        if !self.tokens.verify(raw_token, hash)? {
            return Err(invalid_token());
        }
        if satellite
            .token_expires_at
            .is_some_and(|expires| expires <= Utc::now())
        {
            return Err(Error::Auth("Token expired".to_string()));
        }

        tx.clear_satellite_token(satellite.id)?;

        let robot = tx
            .get_robot_account_by_satellite(satellite.id)?
            .ok_or_else(|| {
                Error::Integrity(format!("satellite {} has no robot account", satellite.name))
            })?;

        let states = tx
            .list_satellite_groups(satellite.id)?
            .iter()
            .map(|group| {
                group_state_location(&group.registry_url, self.issuer.state_namespace(), &group.name)
            })
            .collect();
        tx.touch_robot_account(robot.robot_id)?;
        tx.commit()?;

        tracing::info!("Satellite {} completed zero-touch registration", satellite.name);
        Ok(Bootstrap {
            states,
            auth: RobotCredential {
                name: robot.robot_name,
                secret: robot.robot_secret,
                registry: self.registry_url.clone(),
            },
        })
    }

    /// Revokes the satellite's robot account upstream, then deletes the row.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let tx = self.store.begin().await?;
        let satellite = tx
            .get_satellite_by_name(name)?
            .ok_or_else(|| Error::not_found(format!("Satellite '{name}'")))?;

        let robot = tx.get_robot_account_by_satellite(satellite.id)?;
        match robot {
            Some(robot) => self.issuer.revoke(robot.robot_id).await?,
            None => tracing::warn!("Satellite {name} has no robot account to revoke"),
        }

        tx.delete_satellite(satellite.id)?;
        tx.commit()?;

        tracing::info!("Deleted satellite {name}");
        Ok(())
    }
}

fn store_robot(tx: StoreTx, account: &RobotAccount) -> Result<()> {
    tx.create_robot_account(account)?;
    tx.commit()
}

fn invalid_token() -> Error {
    Error::Auth("Invalid or expired token".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_artifact_url;
    use crate::upstream::MemoryProjects;

    async fn setup() -> (SqliteStore, Arc<MemoryProjects>, Registrar) {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().await.unwrap();
        let upstream = Arc::new(MemoryProjects::default());
        let issuer = Arc::new(CredentialIssuer::new(upstream.clone(), "satellite"));
        let registry = RegistryConfig {
            url: "https://reg.example.com".to_string(),
            ..Default::default()
        };
        let registrar = Registrar::new(store.clone(), issuer, &registry, None);
        (store, upstream, registrar)
    }

    async fn seed_group(store: &SqliteStore, name: &str, image: &str) {
        let conn = store.connection().await.unwrap();
        let group = conn.create_group(name, "reg.example.com").unwrap();
        let image = conn.upsert_image(&parse_artifact_url(image).unwrap()).unwrap();
        conn.add_group_image(group.id, image.id).unwrap();
    }

    #[tokio::test]
    async fn test_register_then_exchange() {
        let (store, upstream, registrar) = setup().await;
        seed_group(&store, "g1", "reg.example.com/app/web:v1").await;

        let registration = registrar.register("sat1", &["g1".to_string()]).await.unwrap();
        assert!(registration.token.starts_with("ztr_"));
        assert!(registration.satellite.is_pending());

        let bootstrap = registrar.exchange(&registration.token).await.unwrap();
        assert_eq!(
            bootstrap.states,
            vec!["reg.example.com/satellite/groups/g1:latest"]
        );
        assert_eq!(bootstrap.auth.name, "robot$sat1");
        assert_eq!(bootstrap.auth.registry, "https://reg.example.com");

        let robot = upstream.robots()[0].clone();
        assert_eq!(robot.projects(), vec!["satellite", "app"]);

        let conn = store.connection().await.unwrap();
        let satellite = conn.get_satellite_by_name("sat1").unwrap().unwrap();
        assert!(!satellite.is_pending());
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let (_store, _upstream, registrar) = setup().await;
        let registration = registrar.register("sat1", &[]).await.unwrap();

        registrar.exchange(&registration.token).await.unwrap();
        let second = registrar.exchange(&registration.token).await;
        assert!(matches!(second, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_exchange_rejects_bad_tokens() {
        let (_store, _upstream, registrar) = setup().await;
        let registration = registrar.register("sat1", &[]).await.unwrap();

        for token in ["garbage", "gc_abcdefgh_secret", "ztr_zzzzzzzz_nope"] {
            assert!(matches!(registrar.exchange(token).await, Err(Error::Auth(_))));
        }

        let (prefix, _) = registration.token.rsplit_once('_').unwrap();
        let forged = format!("{prefix}_{}", "0".repeat(32));
        assert!(matches!(registrar.exchange(&forged).await, Err(Error::Auth(_))));

        // The real token still works after failed attempts.
        registrar.exchange(&registration.token).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (store, upstream, _) = setup().await;
        let issuer = Arc::new(CredentialIssuer::new(upstream, "satellite"));
        let registrar = Registrar::new(
            store,
            issuer,
            &RegistryConfig::default(),
            Some(chrono::Duration::seconds(-1)),
        );

        let registration = registrar.register("sat1", &[]).await.unwrap();
        assert!(matches!(
            registrar.exchange(&registration.token).await,
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_robot_is_integrity_error_and_keeps_token() {
        let (store, _upstream, registrar) = setup().await;
        let registration = registrar.register("sat1", &[]).await.unwrap();

        {
            let conn = store.connection().await.unwrap();
            conn.execute("DELETE FROM robot_accounts", []).unwrap();
        }

        let result = registrar.exchange(&registration.token).await;
        assert!(matches!(result, Err(Error::Integrity(_))));

        let conn = store.connection().await.unwrap();
        let satellite = conn.get_satellite_by_name("sat1").unwrap().unwrap();
        assert!(satellite.is_pending());
    }

    #[tokio::test]
    async fn test_unknown_group_rolls_back() {
        let (store, upstream, registrar) = setup().await;

        let result = registrar.register("sat1", &["nope".to_string()]).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let conn = store.connection().await.unwrap();
        assert!(conn.get_satellite_by_name("sat1").unwrap().is_none());
        assert_eq!(upstream.robot_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_rolls_back() {
        let (store, upstream, registrar) = setup().await;
        upstream.fail_creates(true);

        let result = registrar.register("sat1", &[]).await;
        assert!(matches!(result, Err(Error::Upstream(_))));

        let conn = store.connection().await.unwrap();
        assert!(conn.list_satellites().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let (_store, upstream, registrar) = setup().await;
        registrar.register("sat1", &[]).await.unwrap();

        let result = registrar.register("sat1", &[]).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(upstream.robot_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_revokes_robot() {
        let (store, upstream, registrar) = setup().await;
        registrar.register("sat1", &[]).await.unwrap();

        registrar.delete("sat1").await.unwrap();
        assert_eq!(upstream.robot_count(), 0);

        let conn = store.connection().await.unwrap();
        assert!(conn.get_satellite_by_name("sat1").unwrap().is_none());
        drop(conn);

        assert!(matches!(
            registrar.delete("sat1").await,
            Err(Error::NotFound(_))
        ));
    }
}
