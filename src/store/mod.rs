mod queries;
mod schema;
mod sqlite;

pub use sqlite::{SqliteStore, StoreConn, StoreTx};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Store defines the membership queries.
///
/// It is implemented for `rusqlite::Connection`, so the same calls work on a
/// plain connection guard and inside a [`StoreTx`]. Each method is a single
/// atomic statement (or a short sequence on one table); composite writes are
/// the caller's responsibility to wrap in a transaction.
pub trait Store {
    // Satellite operations
    fn create_satellite(
        &self,
        name: &str,
        token_lookup: &str,
        token_hash: &str,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<Satellite>;
    fn get_satellite(&self, id: i64) -> Result<Option<Satellite>>;
    fn get_satellite_by_name(&self, name: &str) -> Result<Option<Satellite>>;
    fn get_satellite_by_token_lookup(&self, lookup: &str) -> Result<Option<Satellite>>;
    fn list_satellites(&self) -> Result<Vec<Satellite>>;
    fn clear_satellite_token(&self, id: i64) -> Result<bool>;
    fn delete_satellite(&self, id: i64) -> Result<bool>;

    // Group operations
    fn create_group(&self, name: &str, registry_url: &str) -> Result<Group>;
    fn upsert_group(&self, name: &str, registry_url: &str) -> Result<Group>;
    fn get_group(&self, id: i64) -> Result<Option<Group>>;
    fn get_group_by_name(&self, name: &str) -> Result<Option<Group>>;
    fn list_groups(&self) -> Result<Vec<Group>>;
    fn delete_group(&self, id: i64) -> Result<bool>;

    // Label operations
    fn create_label(&self, name: &str) -> Result<Label>;
    fn get_label_by_name(&self, name: &str) -> Result<Option<Label>>;
    fn list_labels(&self) -> Result<Vec<Label>>;
    fn delete_label(&self, id: i64) -> Result<bool>;

    // Image operations
    fn upsert_image(&self, image: &ImageRef) -> Result<Image>;
    fn find_image(&self, image: &ImageRef) -> Result<Option<Image>>;

    // Satellite-Group M2M operations
    fn add_satellite_to_group(&self, satellite_id: i64, group_id: i64) -> Result<bool>;
    fn remove_satellite_from_group(&self, satellite_id: i64, group_id: i64) -> Result<bool>;
    fn list_satellite_groups(&self, satellite_id: i64) -> Result<Vec<Group>>;
    fn list_group_satellites(&self, group_id: i64) -> Result<Vec<Satellite>>;

    // Satellite-Label M2M operations
    fn add_satellite_label(&self, satellite_id: i64, label_id: i64) -> Result<bool>;
    fn remove_satellite_label(&self, satellite_id: i64, label_id: i64) -> Result<bool>;
    fn list_satellite_labels(&self, satellite_id: i64) -> Result<Vec<Label>>;

    // Group-Image M2M operations
    fn add_group_image(&self, group_id: i64, image_id: i64) -> Result<bool>;
    fn remove_group_image(&self, group_id: i64, image_id: i64) -> Result<bool>;
    fn set_group_images(&self, group_id: i64, image_ids: &[i64]) -> Result<()>;
    fn list_group_images(&self, group_id: i64) -> Result<Vec<Image>>;

    // Label-Image M2M operations
    fn add_label_image(&self, label_id: i64, image_id: i64) -> Result<bool>;
    fn remove_label_image(&self, label_id: i64, image_id: i64) -> Result<bool>;
    fn list_label_images(&self, label_id: i64) -> Result<Vec<Image>>;
    fn list_satellite_label_images(&self, satellite_id: i64) -> Result<Vec<Image>>;

    // Robot account operations
    fn create_robot_account(&self, robot: &RobotAccount) -> Result<()>;
    fn get_robot_account_by_satellite(&self, satellite_id: i64) -> Result<Option<RobotAccount>>;
    fn touch_robot_account(&self, robot_id: i64) -> Result<()>;

    // Admin token operations
    fn create_admin_token(&self, token: &AdminToken) -> Result<()>;
    fn get_admin_token_by_lookup(&self, lookup: &str) -> Result<Option<AdminToken>>;
    fn update_admin_token_last_used(&self, id: &str) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    fn ping(&self) -> Result<()>;
}
