mod groups;
mod labels;
mod satellites;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

/// Routes that require an admin bearer token.
pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // Satellite routes
        .route(
            "/satellites",
            post(satellites::create_satellite).get(satellites::list_satellites),
        )
        .route(
            "/satellites/{name}",
            get(satellites::get_satellite).delete(satellites::delete_satellite),
        )
        .route("/satellites/{name}/sync", post(satellites::sync_satellite))
        // Group routes
        .route("/group", post(groups::create_group))
        .route("/group/list", get(groups::list_groups))
        .route(
            "/group/satellite",
            post(groups::add_satellite).delete(groups::remove_satellite),
        )
        .route(
            "/group/images",
            post(groups::assign_image).delete(groups::unassign_image),
        )
        .route(
            "/group/{name}",
            get(groups::get_group).delete(groups::delete_group),
        )
        .route("/group/{name}/satellites", get(groups::list_group_satellites))
        .route("/group/{name}/images", get(groups::list_group_images))
        .route("/groups/sync", post(groups::sync_group))
        // Label routes
        .route("/label", post(labels::create_label))
        .route("/label/list", get(labels::list_labels))
        .route(
            "/label/images",
            post(labels::assign_image).delete(labels::unassign_image),
        )
        .route(
            "/label/satellite",
            post(labels::add_satellite).delete(labels::remove_satellite),
        )
        .route(
            "/label/{name}",
            get(labels::get_label).delete(labels::delete_label),
        )
}
