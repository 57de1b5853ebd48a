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
    CreateSatelliteRequest, CreateSatelliteResponse, SatelliteDetailResponse, SatelliteResponse,
};
use crate::server::response::ApiResult;
use crate::server::validation::{validate_group_name, validate_satellite_name};
use crate::store::Store;
use crate::sync::SyncOutcome;

pub async fn create_satellite(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateSatelliteRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    validate_satellite_name(&req.name)?;
    for group in &req.groups {
        validate_group_name(group)?;
    }

    let registration = state.registrar.register(&req.name, &req.groups).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSatelliteResponse {
            token: registration.token,
        }),
    ))
}

pub async fn list_satellites(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<SatelliteResponse>>> {
    let conn = state.store.reader().await?;
    let satellites = conn.list_satellites()?;
    Ok(Json(satellites.into_iter().map(Into::into).collect()))
}

pub async fn get_satellite(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<SatelliteDetailResponse>> {
    let conn = state.store.reader().await?;
    let satellite = conn
        .get_satellite_by_name(&name)?
        .ok_or_else(|| Error::not_found(format!("Satellite '{name}'")))?;

    let groups = conn
        .list_satellite_groups(satellite.id)?
        .into_iter()
        .map(|g| g.name)
        .collect();
    let labels = conn
        .list_satellite_labels(satellite.id)?
        .into_iter()
        .map(|l| l.name)
        .collect();
    let robot_name = conn
        .get_robot_account_by_satellite(satellite.id)?
        .map(|r| r.robot_name);

    Ok(Json(SatelliteDetailResponse {
        satellite: satellite.into(),
        groups,
        labels,
        robot_name,
    }))
}

pub async fn delete_satellite(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.registrar.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sync_satellite(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<SyncOutcome>> {
    Ok(Json(state.orchestrator.sync_satellite(&name).await?))
}
