use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

/// Per-connection settings. Runs on every connection the pool opens.
pub fn configure_connection(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA temp_store = MEMORY;
    ",
    )?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

// resource_flags holds one row per (resource, flag) that is currently true.
// The unique (parent_id, flag) index makes a second winner uncommittable.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS parents (
    parent_id BLOB PRIMARY KEY CHECK (length(parent_id) = 16),
    created_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);

CREATE TABLE IF NOT EXISTS resources (
    resource_id BLOB PRIMARY KEY CHECK (length(resource_id) = 16),
    parent_id BLOB NOT NULL REFERENCES parents (parent_id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    order_key INTEGER NOT NULL UNIQUE,
    created_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);
CREATE INDEX IF NOT EXISTS idx_resources_parent ON resources (parent_id, order_key);

CREATE TABLE IF NOT EXISTS resource_flags (
    resource_id BLOB NOT NULL REFERENCES resources (resource_id) ON DELETE CASCADE,
    parent_id BLOB NOT NULL CHECK (length(parent_id) = 16),
    flag TEXT NOT NULL,
    set_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    PRIMARY KEY (resource_id, flag)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_resource_flags_winner ON resource_flags (parent_id, flag);
";
