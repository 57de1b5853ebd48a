#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use groundctl::auth::{TokenGenerator, TokenKind};
use groundctl::config::{RegistryConfig, ServerConfig};
use groundctl::server::{AppState, create_router};
use groundctl::store::{SqliteStore, Store};
use groundctl::types::AdminToken;
use groundctl::upstream::{MemoryProjects, MemoryRegistry};

pub struct TestApp {
    pub temp_dir: TempDir,
    pub store: SqliteStore,
    pub projects: Arc<MemoryProjects>,
    pub registry: Arc<MemoryRegistry>,
    pub admin_token: String,
    router: Router,
}

impl TestApp {
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            registry: RegistryConfig {
                url: "https://reg.example.com".to_string(),
                username: "admin".to_string(),
                password: "password".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let store = SqliteStore::new(config.db_path()).expect("open store");
        store.initialize().await.expect("initialize store");

        let generated = TokenGenerator::new()
            .generate(TokenKind::Admin)
            .expect("generate admin token");
        store
            .connection()
            .await
            .expect("connection")
            .create_admin_token(&AdminToken {
                id: uuid::Uuid::new_v4().to_string(),
                token_hash: generated.hash,
                token_lookup: generated.lookup,
                created_at: Utc::now(),
                last_used_at: None,
            })
            .expect("store admin token");

        let projects = Arc::new(MemoryProjects::default());
        let registry = Arc::new(MemoryRegistry::default());
        let state = Arc::new(AppState::new(
            store.clone(),
            &config,
            projects.clone(),
            registry.clone(),
        ));

        Self {
            temp_dir,
            store,
            projects,
            registry,
            admin_token: generated.raw,
            router: create_router(state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, body.to_vec())
    }

    /// Sends an admin-authenticated request and parses the JSON reply.
    pub async fn admin(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.json(method, path, body, Some(&self.admin_token)).await
    }

    pub async fn json(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let (status, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    /// Decoded state document currently tagged `latest` at `repository`.
    pub fn published_state(&self, repository: &str) -> Option<Value> {
        let manifest: Value = serde_json::from_slice(&self.registry.manifest(repository, "latest")?).ok()?;
        let digest = manifest["layers"][0]["digest"].as_str()?;
        let layer = self.registry.blob(digest)?;
        serde_json::from_slice(&layer).ok()
    }
}
