use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use serde_json::json;

use super::admin::admin_router;
use super::ztr::ztr_router;
use crate::config::ServerConfig;
use crate::credentials::CredentialIssuer;
use crate::registration::Registrar;
use crate::state::Publisher;
use crate::store::{SqliteStore, Store};
use crate::sync::Orchestrator;
use crate::upstream::{ArtifactRegistry, RegistryProjects};

/// Components shared by every handler, built once at startup.
pub struct AppState {
    pub store: SqliteStore,
    pub registrar: Registrar,
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(
        store: SqliteStore,
        config: &ServerConfig,
        projects: Arc<dyn RegistryProjects>,
        artifacts: Arc<dyn ArtifactRegistry>,
    ) -> Self {
        let namespace = config.registry.state_namespace.clone();
        let issuer = Arc::new(CredentialIssuer::new(projects, namespace.clone()));
        let publisher = Arc::new(Publisher::new(artifacts, namespace));

        Self {
            registrar: Registrar::new(
                store.clone(),
                issuer.clone(),
                &config.registry,
                config.token_ttl(),
            ),
            orchestrator: Orchestrator::new(
                store.clone(),
                issuer,
                publisher,
                config.registry.host(),
            ),
            store,
        }
    }
}

async fn ping() -> &'static str {
    "pong"
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let result = match state.store.reader().await {
        Ok(conn) => conn.ping(),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Json(json!({ "status": "healthy" })).into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy" })),
            )
                .into_response()
        }
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .merge(ztr_router())
        .merge(admin_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
