pub const SCHEMA: &str = r#"
-- Satellites are created with a bootstrap token and become active once it is exchanged
CREATE TABLE IF NOT EXISTS satellites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(name) > 0),

    -- Bootstrap token (argon2id hash + lookup); all NULL once consumed
    token_lookup TEXT UNIQUE,
    token_hash TEXT,
    token_expires_at TEXT,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Replication groups
CREATE TABLE IF NOT EXISTS replication_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    registry_url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Labels, independent of groups
CREATE TABLE IF NOT EXISTS labels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Images; empty string stands for an absent tag or digest
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    registry TEXT NOT NULL,
    repository TEXT NOT NULL,
    tag TEXT NOT NULL DEFAULT '',
    digest TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    CHECK (tag <> '' OR digest <> ''),
    UNIQUE(registry, repository, tag, digest)
);

-- Robot account issued upstream, at most one per satellite
CREATE TABLE IF NOT EXISTS robot_accounts (
    robot_id INTEGER PRIMARY KEY,
    robot_name TEXT NOT NULL UNIQUE,
    robot_secret TEXT NOT NULL,
    satellite_id INTEGER NOT NULL UNIQUE REFERENCES satellites(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Many-to-many associations; deleting either side never deletes images
CREATE TABLE IF NOT EXISTS satellite_group_members (
    satellite_id INTEGER NOT NULL REFERENCES satellites(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES replication_groups(id) ON DELETE CASCADE,
    PRIMARY KEY (satellite_id, group_id)
);

CREATE TABLE IF NOT EXISTS satellite_labels (
    satellite_id INTEGER NOT NULL REFERENCES satellites(id) ON DELETE CASCADE,
    label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
    PRIMARY KEY (satellite_id, label_id)
);

CREATE TABLE IF NOT EXISTS group_images (
    group_id INTEGER NOT NULL REFERENCES replication_groups(id) ON DELETE CASCADE,
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, image_id)
);

CREATE TABLE IF NOT EXISTS label_images (
    label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    PRIMARY KEY (label_id, image_id)
);

-- Admin API tokens
CREATE TABLE IF NOT EXISTS admin_tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- lookup segment of the token for fast lookup
    created_at TEXT NOT NULL,
    last_used_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_admin_tokens_lookup ON admin_tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_members_group ON satellite_group_members(group_id);
CREATE INDEX IF NOT EXISTS idx_satellite_labels_label ON satellite_labels(label_id);
CREATE INDEX IF NOT EXISTS idx_group_images_image ON group_images(image_id);
CREATE INDEX IF NOT EXISTS idx_label_images_image ON label_images(image_id);
"#;
