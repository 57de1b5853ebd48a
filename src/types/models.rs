use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ImageRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Satellite {
    pub id: i64,
    pub name: String,
    #[serde(skip)]
    pub token_lookup: Option<String>,
    #[serde(skip)]
    pub token_hash: Option<String>,
    #[serde(skip)]
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Satellite {
    /// A satellite is pending until its bootstrap token has been exchanged.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.token_lookup.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub registry_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub registry: String,
    pub repository: String,
    pub tag: String,
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Image {
    #[must_use]
    pub fn to_ref(&self) -> ImageRef {
        ImageRef {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: self.tag.clone(),
            digest: self.digest.clone(),
        }
    }
}

/// Robot account issued upstream for exactly one satellite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotAccount {
    pub robot_id: i64,
    pub robot_name: String,
    #[serde(skip_serializing)]
    pub robot_secret: String,
    pub satellite_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Administrative API token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminToken {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Which kind of subject a state artifact describes. Only selects the
/// destination path template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Group,
    Satellite,
}

impl SubjectKind {
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            SubjectKind::Group => "groups",
            SubjectKind::Satellite => "satellites",
        }
    }
}
