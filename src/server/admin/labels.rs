use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use crate::auth::RequireAdmin;
use rusqlite::Connection;

use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{
    AssociationResponse, CreateLabelRequest, LabelImageRequest, SatelliteLabelRequest,
};
use crate::server::response::ApiResult;
use crate::server::validation::validate_label_name;
use crate::store::Store;
use crate::types::{ImageRef, Label, parse_artifact_url};

#[derive(Serialize)]
pub struct LabelResponse {
    #[serde(flatten)]
    label: Label,
    images: Vec<ImageRef>,
}

pub async fn create_label(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateLabelRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    validate_label_name(&req.name)?;

    let conn = state.store.connection().await?;
    let label = conn.create_label(&req.name)?;
    tracing::info!("Created label {}", label.name);

    Ok((StatusCode::CREATED, Json(label)))
}

pub async fn list_labels(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Label>>> {
    let conn = state.store.reader().await?;
    Ok(Json(conn.list_labels()?))
}

pub async fn get_label(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<LabelResponse>> {
    let conn = state.store.reader().await?;
    let label = conn
        .get_label_by_name(&name)?
        .ok_or_else(|| Error::not_found(format!("Label '{name}'")))?;
    let images = conn
        .list_label_images(label.id)?
        .iter()
        .map(|i| i.to_ref())
        .collect();
    Ok(Json(LabelResponse { label, images }))
}

pub async fn delete_label(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let conn = state.store.connection().await?;
    let label = conn
        .get_label_by_name(&name)?
        .ok_or_else(|| Error::not_found(format!("Label '{name}'")))?;
    conn.delete_label(label.id)?;
    tracing::info!("Deleted label {name}");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_image(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LabelImageRequest>, JsonRejection>,
) -> ApiResult<Json<AssociationResponse>> {
    let Json(req) = payload?;
    let image = parse_artifact_url(&req.image)?;

    let tx = state.store.begin().await?;
    let label = tx
        .get_label_by_name(&req.label)?
        .ok_or_else(|| Error::not_found(format!("Label '{}'", req.label)))?;
    let image = tx.upsert_image(&image)?;
    let changed = tx.add_label_image(label.id, image.id)?;
    tx.commit()?;

    Ok(Json(AssociationResponse { changed }))
}

pub async fn unassign_image(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LabelImageRequest>, JsonRejection>,
) -> ApiResult<Json<AssociationResponse>> {
    let Json(req) = payload?;
    let image = parse_artifact_url(&req.image)?;

    let conn = state.store.connection().await?;
    let label = conn
        .get_label_by_name(&req.label)?
        .ok_or_else(|| Error::not_found(format!("Label '{}'", req.label)))?;
    let changed = match conn.find_image(&image)? {
        Some(image) => conn.remove_label_image(label.id, image.id)?,
        None => false,
    };

    Ok(Json(AssociationResponse { changed }))
}

pub async fn add_satellite(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SatelliteLabelRequest>, JsonRejection>,
) -> ApiResult<Json<AssociationResponse>> {
    let Json(req) = payload?;
    let conn = state.store.connection().await?;
    let (satellite_id, label_id) = resolve_pair(&conn, &req)?;
    let changed = conn.add_satellite_label(satellite_id, label_id)?;
    Ok(Json(AssociationResponse { changed }))
}

pub async fn remove_satellite(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SatelliteLabelRequest>, JsonRejection>,
) -> ApiResult<Json<AssociationResponse>> {
    let Json(req) = payload?;
    let conn = state.store.connection().await?;
    let (satellite_id, label_id) = resolve_pair(&conn, &req)?;
    let changed = conn.remove_satellite_label(satellite_id, label_id)?;
    Ok(Json(AssociationResponse { changed }))
}

fn resolve_pair(conn: &Connection, req: &SatelliteLabelRequest) -> crate::error::Result<(i64, i64)> {
    let satellite = conn
        .get_satellite_by_name(&req.satellite)?
        .ok_or_else(|| Error::not_found(format!("Satellite '{}'", req.satellite)))?;
    let label = conn
        .get_label_by_name(&req.label)?
        .ok_or_else(|| Error::not_found(format!("Label '{}'", req.label)))?;
    Ok((satellite.id, label.id))
}
