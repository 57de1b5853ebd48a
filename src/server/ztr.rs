use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{get, post},
};

use crate::registration::Bootstrap;
use crate::server::AppState;
use crate::server::dto::ZtrRequest;
use crate::server::response::ApiResult;

/// Zero-touch registration. Unauthenticated; the bootstrap token is the
/// credential.
pub fn ztr_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/satellites/ztr", post(exchange_body))
        .route("/satellites/ztr/{token}", get(exchange_path))
}

async fn exchange_path(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<Json<Bootstrap>> {
    Ok(Json(state.registrar.exchange(&token).await?))
}

async fn exchange_body(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ZtrRequest>, JsonRejection>,
) -> ApiResult<Json<Bootstrap>> {
    let Json(req) = payload?;
    Ok(Json(state.registrar.exchange(&req.token).await?))
}
