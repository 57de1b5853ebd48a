use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{
    AssociationResponse, CreateGroupRequest, GroupImageRequest, SatelliteGroupRequest,
    SatelliteResponse,
};
use crate::server::response::ApiResult;
use crate::server::validation::validate_group_name;
use crate::store::Store;
use crate::sync::{GroupSync, SyncOutcome};
use crate::types::{Group, ImageRef, parse_artifact_url};

pub async fn create_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    validate_group_name(&req.name)?;

    let conn = state.store.connection().await?;
    let group = conn.create_group(&req.name, state.orchestrator.registry_host())?;
    tracing::info!("Created group {}", group.name);

    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_groups(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Group>>> {
    let conn = state.store.reader().await?;
    Ok(Json(conn.list_groups()?))
}

pub async fn get_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Group>> {
    let conn = state.store.reader().await?;
    let group = conn
        .get_group_by_name(&name)?
        .ok_or_else(|| Error::not_found(format!("Group '{name}'")))?;
    Ok(Json(group))
}

pub async fn delete_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.delete_group(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_group_satellites(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<SatelliteResponse>>> {
    let conn = state.store.reader().await?;
    let group = conn
        .get_group_by_name(&name)?
        .ok_or_else(|| Error::not_found(format!("Group '{name}'")))?;
    let satellites = conn.list_group_satellites(group.id)?;
    Ok(Json(satellites.into_iter().map(Into::into).collect()))
}

pub async fn list_group_images(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<ImageRef>>> {
    let conn = state.store.reader().await?;
    let group = conn
        .get_group_by_name(&name)?
        .ok_or_else(|| Error::not_found(format!("Group '{name}'")))?;
    let images = conn.list_group_images(group.id)?;
    Ok(Json(images.iter().map(|i| i.to_ref()).collect()))
}

pub async fn add_satellite(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SatelliteGroupRequest>, JsonRejection>,
) -> ApiResult<Json<AssociationResponse>> {
    let Json(req) = payload?;
    let changed = state
        .orchestrator
        .join_group(&req.satellite, &req.group)
        .await?;
    Ok(Json(AssociationResponse { changed }))
}

pub async fn remove_satellite(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SatelliteGroupRequest>, JsonRejection>,
) -> ApiResult<Json<AssociationResponse>> {
    let Json(req) = payload?;
    let changed = state
        .orchestrator
        .leave_group(&req.satellite, &req.group)
        .await?;
    Ok(Json(AssociationResponse { changed }))
}

pub async fn assign_image(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GroupImageRequest>, JsonRejection>,
) -> ApiResult<Json<AssociationResponse>> {
    let Json(req) = payload?;
    let image = parse_artifact_url(&req.image)?;
    let changed = state.orchestrator.assign_image(&req.group, &image).await?;
    Ok(Json(AssociationResponse { changed }))
}

pub async fn unassign_image(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GroupImageRequest>, JsonRejection>,
) -> ApiResult<Json<AssociationResponse>> {
    let Json(req) = payload?;
    let image = parse_artifact_url(&req.image)?;
    let changed = state.orchestrator.unassign_image(&req.group, &image).await?;
    Ok(Json(AssociationResponse { changed }))
}

pub async fn sync_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GroupSync>, JsonRejection>,
) -> ApiResult<Json<SyncOutcome>> {
    let Json(req) = payload?;
    validate_group_name(&req.group)?;
    Ok(Json(state.orchestrator.sync_group(req).await?))
}
