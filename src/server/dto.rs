use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Satellite;

#[derive(Debug, Deserialize)]
pub struct CreateSatelliteRequest {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSatelliteResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ZtrRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateLabelRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SatelliteGroupRequest {
    pub satellite: String,
    pub group: String,
}

#[derive(Debug, Deserialize)]
pub struct SatelliteLabelRequest {
    pub satellite: String,
    pub label: String,
}

/// `image` is an artifact URL such as `reg.example.com/app/web:v1`.
#[derive(Debug, Deserialize)]
pub struct GroupImageRequest {
    pub group: String,
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelImageRequest {
    pub label: String,
    pub image: String,
}

/// Result of an idempotent association edit.
#[derive(Debug, Serialize)]
pub struct AssociationResponse {
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct SatelliteResponse {
    pub id: i64,
    pub name: String,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Satellite> for SatelliteResponse {
    fn from(satellite: Satellite) -> Self {
        Self {
            id: satellite.id,
            status: if satellite.is_pending() {
                "pending"
            } else {
                "active"
            },
            name: satellite.name,
            created_at: satellite.created_at,
            updated_at: satellite.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SatelliteDetailResponse {
    #[serde(flatten)]
    pub satellite: SatelliteResponse,
    pub groups: Vec<String>,
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robot_name: Option<String>,
}
