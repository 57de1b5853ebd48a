use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use crate::error::{Error, Result};
use crate::types::*;

const SATELLITE_COLUMNS: &str =
    "s.id, s.name, s.token_lookup, s.token_hash, s.token_expires_at, s.created_at, s.updated_at";
const GROUP_COLUMNS: &str = "g.id, g.name, g.registry_url, g.created_at, g.updated_at";
const LABEL_COLUMNS: &str = "l.id, l.name, l.created_at, l.updated_at";
const IMAGE_COLUMNS: &str =
    "i.id, i.registry, i.repository, i.tag, i.digest, i.created_at, i.updated_at";

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn satellite_from_row(row: &Row<'_>) -> rusqlite::Result<Satellite> {
    Ok(Satellite {
        id: row.get(0)?,
        name: row.get(1)?,
        token_lookup: row.get(2)?,
        token_hash: row.get(3)?,
        token_expires_at: row.get::<_, Option<String>>(4)?.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        registry_url: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn label_from_row(row: &Row<'_>) -> rusqlite::Result<Label> {
    Ok(Label {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
        updated_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        registry: row.get(1)?,
        repository: row.get(2)?,
        tag: row.get(3)?,
        digest: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn robot_from_row(row: &Row<'_>) -> rusqlite::Result<RobotAccount> {
    Ok(RobotAccount {
        robot_id: row.get(0)?,
        robot_name: row.get(1)?,
        robot_secret: row.get(2)?,
        satellite_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn admin_token_from_row(row: &Row<'_>) -> rusqlite::Result<AdminToken> {
    Ok(AdminToken {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        last_used_at: row.get::<_, Option<String>>(4)?.map(|s| parse_datetime(&s)),
    })
}

fn query_all<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> Result<Vec<T>>
where
    P: rusqlite::Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, f)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

impl Store for Connection {
    // Satellite operations

    fn create_satellite(
        &self,
        name: &str,
        token_lookup: &str,
        token_hash: &str,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<Satellite> {
        let now = format_datetime(&Utc::now());
        self.execute(
            "INSERT INTO satellites (name, token_lookup, token_hash, token_expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                name,
                token_lookup,
                token_hash,
                token_expires_at.as_ref().map(format_datetime),
                now,
            ],
        )
        .map_err(|e| Error::from(e).on_conflict(format!("Satellite '{name}' already exists")))?;

        self.get_satellite(self.last_insert_rowid())?
            .ok_or_else(|| Error::Integrity("inserted satellite is missing".to_string()))
    }

    fn get_satellite(&self, id: i64) -> Result<Option<Satellite>> {
        self.query_row(
            &format!("SELECT {SATELLITE_COLUMNS} FROM satellites s WHERE s.id = ?1"),
            params![id],
            satellite_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_satellite_by_name(&self, name: &str) -> Result<Option<Satellite>> {
        self.query_row(
            &format!("SELECT {SATELLITE_COLUMNS} FROM satellites s WHERE s.name = ?1"),
            params![name],
            satellite_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_satellite_by_token_lookup(&self, lookup: &str) -> Result<Option<Satellite>> {
        self.query_row(
            &format!("SELECT {SATELLITE_COLUMNS} FROM satellites s WHERE s.token_lookup = ?1"),
            params![lookup],
            satellite_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_satellites(&self) -> Result<Vec<Satellite>> {
        query_all(
            self,
            &format!("SELECT {SATELLITE_COLUMNS} FROM satellites s ORDER BY s.id"),
            [],
            satellite_from_row,
        )
    }

    fn clear_satellite_token(&self, id: i64) -> Result<bool> {
        let rows = self.execute(
            "UPDATE satellites
             SET token_lookup = NULL, token_hash = NULL, token_expires_at = NULL, updated_at = ?1
             WHERE id = ?2 AND token_lookup IS NOT NULL",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(rows > 0)
    }

    fn delete_satellite(&self, id: i64) -> Result<bool> {
        let rows = self.execute("DELETE FROM satellites WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Group operations

    fn create_group(&self, name: &str, registry_url: &str) -> Result<Group> {
        let now = format_datetime(&Utc::now());
        self.execute(
            "INSERT INTO replication_groups (name, registry_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![name, registry_url, now],
        )
        .map_err(|e| Error::from(e).on_conflict(format!("Group '{name}' already exists")))?;

        self.get_group(self.last_insert_rowid())?
            .ok_or_else(|| Error::Integrity("inserted group is missing".to_string()))
    }

    fn upsert_group(&self, name: &str, registry_url: &str) -> Result<Group> {
        let now = format_datetime(&Utc::now());
        self.execute(
            "INSERT INTO replication_groups (name, registry_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (name) DO UPDATE SET
                registry_url = excluded.registry_url,
                updated_at = excluded.updated_at",
            params![name, registry_url, now],
        )?;

        self.get_group_by_name(name)?
            .ok_or_else(|| Error::Integrity("upserted group is missing".to_string()))
    }

    fn get_group(&self, id: i64) -> Result<Option<Group>> {
        self.query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM replication_groups g WHERE g.id = ?1"),
            params![id],
            group_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        self.query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM replication_groups g WHERE g.name = ?1"),
            params![name],
            group_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        query_all(
            self,
            &format!("SELECT {GROUP_COLUMNS} FROM replication_groups g ORDER BY g.id"),
            [],
            group_from_row,
        )
    }

    fn delete_group(&self, id: i64) -> Result<bool> {
        let rows = self.execute("DELETE FROM replication_groups WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Label operations

    fn create_label(&self, name: &str) -> Result<Label> {
        let now = format_datetime(&Utc::now());
        self.execute(
            "INSERT INTO labels (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![name, now],
        )
        .map_err(|e| Error::from(e).on_conflict(format!("Label '{name}' already exists")))?;

        self.query_row(
            &format!("SELECT {LABEL_COLUMNS} FROM labels l WHERE l.id = ?1"),
            params![self.last_insert_rowid()],
            label_from_row,
        )
        .map_err(Error::from)
    }

    fn get_label_by_name(&self, name: &str) -> Result<Option<Label>> {
        self.query_row(
            &format!("SELECT {LABEL_COLUMNS} FROM labels l WHERE l.name = ?1"),
            params![name],
            label_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        query_all(
            self,
            &format!("SELECT {LABEL_COLUMNS} FROM labels l ORDER BY l.id"),
            [],
            label_from_row,
        )
    }

    fn delete_label(&self, id: i64) -> Result<bool> {
        let rows = self.execute("DELETE FROM labels WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Image operations

    fn upsert_image(&self, image: &ImageRef) -> Result<Image> {
        image.validate()?;
        let now = format_datetime(&Utc::now());
        self.execute(
            "INSERT INTO images (registry, repository, tag, digest, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (registry, repository, tag, digest) DO NOTHING",
            params![image.registry, image.repository, image.tag, image.digest, now],
        )?;

        self.find_image(image)?
            .ok_or_else(|| Error::Integrity(format!("upserted image {image} is missing")))
    }

    fn find_image(&self, image: &ImageRef) -> Result<Option<Image>> {
        self.query_row(
            &format!(
                "SELECT {IMAGE_COLUMNS} FROM images i
                 WHERE i.registry = ?1 AND i.repository = ?2 AND i.tag = ?3 AND i.digest = ?4"
            ),
            params![image.registry, image.repository, image.tag, image.digest],
            image_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    // Satellite-Group M2M operations

    fn add_satellite_to_group(&self, satellite_id: i64, group_id: i64) -> Result<bool> {
        let rows = self.execute(
            "INSERT OR IGNORE INTO satellite_group_members (satellite_id, group_id) VALUES (?1, ?2)",
            params![satellite_id, group_id],
        )?;
        Ok(rows > 0)
    }

    fn remove_satellite_from_group(&self, satellite_id: i64, group_id: i64) -> Result<bool> {
        let rows = self.execute(
            "DELETE FROM satellite_group_members WHERE satellite_id = ?1 AND group_id = ?2",
            params![satellite_id, group_id],
        )?;
        Ok(rows > 0)
    }

    fn list_satellite_groups(&self, satellite_id: i64) -> Result<Vec<Group>> {
        query_all(
            self,
            &format!(
                "SELECT {GROUP_COLUMNS} FROM replication_groups g
                 JOIN satellite_group_members m ON g.id = m.group_id
                 WHERE m.satellite_id = ?1
                 ORDER BY g.name"
            ),
            params![satellite_id],
            group_from_row,
        )
    }

    fn list_group_satellites(&self, group_id: i64) -> Result<Vec<Satellite>> {
        query_all(
            self,
            &format!(
                "SELECT {SATELLITE_COLUMNS} FROM satellites s
                 JOIN satellite_group_members m ON s.id = m.satellite_id
                 WHERE m.group_id = ?1
                 ORDER BY s.name"
            ),
            params![group_id],
            satellite_from_row,
        )
    }

    // Satellite-Label M2M operations

    fn add_satellite_label(&self, satellite_id: i64, label_id: i64) -> Result<bool> {
        let rows = self.execute(
            "INSERT OR IGNORE INTO satellite_labels (satellite_id, label_id) VALUES (?1, ?2)",
            params![satellite_id, label_id],
        )?;
        Ok(rows > 0)
    }

    fn remove_satellite_label(&self, satellite_id: i64, label_id: i64) -> Result<bool> {
        let rows = self.execute(
            "DELETE FROM satellite_labels WHERE satellite_id = ?1 AND label_id = ?2",
            params![satellite_id, label_id],
        )?;
        Ok(rows > 0)
    }

    fn list_satellite_labels(&self, satellite_id: i64) -> Result<Vec<Label>> {
        query_all(
            self,
            &format!(
                "SELECT {LABEL_COLUMNS} FROM labels l
                 JOIN satellite_labels sl ON l.id = sl.label_id
                 WHERE sl.satellite_id = ?1
                 ORDER BY l.name"
            ),
            params![satellite_id],
            label_from_row,
        )
    }

    // Group-Image M2M operations

    fn add_group_image(&self, group_id: i64, image_id: i64) -> Result<bool> {
        let rows = self.execute(
            "INSERT OR IGNORE INTO group_images (group_id, image_id) VALUES (?1, ?2)",
            params![group_id, image_id],
        )?;
        Ok(rows > 0)
    }

    fn remove_group_image(&self, group_id: i64, image_id: i64) -> Result<bool> {
        let rows = self.execute(
            "DELETE FROM group_images WHERE group_id = ?1 AND image_id = ?2",
            params![group_id, image_id],
        )?;
        Ok(rows > 0)
    }

    fn set_group_images(&self, group_id: i64, image_ids: &[i64]) -> Result<()> {
        self.execute("DELETE FROM group_images WHERE group_id = ?1", params![group_id])?;

        let mut stmt =
            self.prepare("INSERT OR IGNORE INTO group_images (group_id, image_id) VALUES (?1, ?2)")?;
        for image_id in image_ids {
            stmt.execute(params![group_id, image_id])?;
        }
        Ok(())
    }

    fn list_group_images(&self, group_id: i64) -> Result<Vec<Image>> {
        query_all(
            self,
            &format!(
                "SELECT {IMAGE_COLUMNS} FROM images i
                 JOIN group_images gi ON i.id = gi.image_id
                 WHERE gi.group_id = ?1
                 ORDER BY i.id"
            ),
            params![group_id],
            image_from_row,
        )
    }

    // Label-Image M2M operations

    fn add_label_image(&self, label_id: i64, image_id: i64) -> Result<bool> {
        let rows = self.execute(
            "INSERT OR IGNORE INTO label_images (label_id, image_id) VALUES (?1, ?2)",
            params![label_id, image_id],
        )?;
        Ok(rows > 0)
    }

    fn remove_label_image(&self, label_id: i64, image_id: i64) -> Result<bool> {
        let rows = self.execute(
            "DELETE FROM label_images WHERE label_id = ?1 AND image_id = ?2",
            params![label_id, image_id],
        )?;
        Ok(rows > 0)
    }

    fn list_label_images(&self, label_id: i64) -> Result<Vec<Image>> {
        query_all(
            self,
            &format!(
                "SELECT {IMAGE_COLUMNS} FROM images i
                 JOIN label_images li ON i.id = li.image_id
                 WHERE li.label_id = ?1
                 ORDER BY i.id"
            ),
            params![label_id],
            image_from_row,
        )
    }

    fn list_satellite_label_images(&self, satellite_id: i64) -> Result<Vec<Image>> {
        query_all(
            self,
            &format!(
                "SELECT DISTINCT {IMAGE_COLUMNS} FROM images i
                 JOIN label_images li ON i.id = li.image_id
                 JOIN satellite_labels sl ON li.label_id = sl.label_id
                 WHERE sl.satellite_id = ?1
                 ORDER BY i.id"
            ),
            params![satellite_id],
            image_from_row,
        )
    }

    // Robot account operations

    fn create_robot_account(&self, robot: &RobotAccount) -> Result<()> {
        self.execute(
            "INSERT INTO robot_accounts (robot_id, robot_name, robot_secret, satellite_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                robot.robot_id,
                robot.robot_name,
                robot.robot_secret,
                robot.satellite_id,
                format_datetime(&robot.created_at),
                format_datetime(&robot.updated_at),
            ],
        )
        .map_err(|e| {
            Error::from(e).on_conflict(format!(
                "Satellite {} already has a robot account",
                robot.satellite_id
            ))
        })?;
        Ok(())
    }

    fn get_robot_account_by_satellite(&self, satellite_id: i64) -> Result<Option<RobotAccount>> {
        self.query_row(
            "SELECT robot_id, robot_name, robot_secret, satellite_id, created_at, updated_at
             FROM robot_accounts WHERE satellite_id = ?1",
            params![satellite_id],
            robot_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn touch_robot_account(&self, robot_id: i64) -> Result<()> {
        self.execute(
            "UPDATE robot_accounts SET updated_at = ?1 WHERE robot_id = ?2",
            params![format_datetime(&Utc::now()), robot_id],
        )?;
        Ok(())
    }

    // Admin token operations

    fn create_admin_token(&self, token: &AdminToken) -> Result<()> {
        let result = self.execute(
            "INSERT INTO admin_tokens (id, token_hash, token_lookup, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                format_datetime(&token.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_admin_token_by_lookup(&self, lookup: &str) -> Result<Option<AdminToken>> {
        self.query_row(
            "SELECT id, token_hash, token_lookup, created_at, last_used_at
             FROM admin_tokens WHERE token_lookup = ?1",
            params![lookup],
            admin_token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_admin_token_last_used(&self, id: &str) -> Result<()> {
        self.execute(
            "UPDATE admin_tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let count: i64 = self.query_row("SELECT COUNT(*) FROM admin_tokens", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn ping(&self) -> Result<()> {
        self.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
