//! Parameterized statements against the resource tables.
//!
//! Every statement binds caller-supplied values as parameters. Flag names
//! reach SQL only as bound `TEXT`, never spliced into statement text.

use rusqlite::{Connection, OptionalExtension};

use gallery_core::{FlagName, ParentId, ResourceId, ResourceRecord};

use crate::error::StorageError;

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn read_resource(
    (resource_id, parent_id, url, order_key): (Vec<u8>, Vec<u8>, String, i64),
) -> Result<ResourceRecord, StorageError> {
    Ok(ResourceRecord {
        resource_id: ResourceId::from_bytes(to_array::<16>(resource_id, "resource_id")?),
        parent_id: ParentId::from_bytes(to_array::<16>(parent_id, "parent_id")?),
        url,
        order_key,
    })
}

type ResourceRow = (Vec<u8>, Vec<u8>, String, i64);

fn resource_row(row: &rusqlite::Row) -> rusqlite::Result<ResourceRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

pub(crate) fn parent_exists(conn: &Connection, parent_id: ParentId) -> Result<bool, StorageError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM parents WHERE parent_id = ?1",
            rusqlite::params![parent_id.as_bytes().as_slice()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn insert_parent(conn: &Connection, parent_id: ParentId) -> Result<bool, StorageError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO parents (parent_id) VALUES (?1)",
        rusqlite::params![parent_id.as_bytes().as_slice()],
    )?;
    Ok(inserted == 1)
}

pub(crate) fn parents(conn: &Connection) -> Result<Vec<ParentId>, StorageError> {
    let mut stmt = conn.prepare("SELECT parent_id FROM parents ORDER BY parent_id")?;
    let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
    let mut result = Vec::new();
    for row in rows {
        result.push(ParentId::from_bytes(to_array::<16>(row?, "parent_id")?));
    }
    Ok(result)
}

pub(crate) fn resource(
    conn: &Connection,
    resource_id: ResourceId,
) -> Result<Option<ResourceRecord>, StorageError> {
    let row = conn
        .query_row(
            "SELECT resource_id, parent_id, url, order_key FROM resources WHERE resource_id = ?1",
            rusqlite::params![resource_id.as_bytes().as_slice()],
            resource_row,
        )
        .optional()?;
    row.map(read_resource).transpose()
}

pub(crate) fn resources_of(
    conn: &Connection,
    parent_id: ParentId,
) -> Result<Vec<ResourceRecord>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT resource_id, parent_id, url, order_key FROM resources WHERE parent_id = ?1 ORDER BY order_key",
    )?;
    let rows = stmt.query_map(
        rusqlite::params![parent_id.as_bytes().as_slice()],
        resource_row,
    )?;
    let mut result = Vec::new();
    for row in rows {
        result.push(read_resource(row?)?);
    }
    Ok(result)
}

pub(crate) fn all_resources(conn: &Connection) -> Result<Vec<ResourceRecord>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT resource_id, parent_id, url, order_key FROM resources ORDER BY order_key",
    )?;
    let rows = stmt.query_map([], resource_row)?;
    let mut result = Vec::new();
    for row in rows {
        result.push(read_resource(row?)?);
    }
    Ok(result)
}

pub(crate) fn first_by_order_key(
    conn: &Connection,
    parent_id: ParentId,
) -> Result<Option<ResourceId>, StorageError> {
    let row: Option<Vec<u8>> = conn
        .query_row(
            "SELECT resource_id FROM resources WHERE parent_id = ?1 ORDER BY order_key LIMIT 1",
            rusqlite::params![parent_id.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    row.map(|bytes| to_array::<16>(bytes, "resource_id").map(ResourceId::from_bytes))
        .transpose()
}

pub(crate) fn insert_resource(
    conn: &Connection,
    parent_id: ParentId,
    url: &str,
) -> Result<ResourceRecord, StorageError> {
    let resource_id = ResourceId::new();
    let order_key: i64 = conn.query_row(
        "SELECT COALESCE(MAX(order_key), 0) + 1 FROM resources",
        [],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO resources (resource_id, parent_id, url, order_key) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            resource_id.as_bytes().as_slice(),
            parent_id.as_bytes().as_slice(),
            url,
            order_key,
        ],
    )?;
    Ok(ResourceRecord {
        resource_id,
        parent_id,
        url: url.to_string(),
        order_key,
    })
}

pub(crate) fn delete_resource(
    conn: &Connection,
    parent_id: ParentId,
    resource_id: ResourceId,
) -> Result<bool, StorageError> {
    let deleted = conn.execute(
        "DELETE FROM resources WHERE resource_id = ?1 AND parent_id = ?2",
        rusqlite::params![
            resource_id.as_bytes().as_slice(),
            parent_id.as_bytes().as_slice(),
        ],
    )?;
    Ok(deleted == 1)
}

pub(crate) fn winner(
    conn: &Connection,
    parent_id: ParentId,
    flag: &FlagName,
) -> Result<Option<ResourceId>, StorageError> {
    let row: Option<Vec<u8>> = conn
        .query_row(
            "SELECT resource_id FROM resource_flags WHERE parent_id = ?1 AND flag = ?2",
            rusqlite::params![parent_id.as_bytes().as_slice(), flag.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    row.map(|bytes| to_array::<16>(bytes, "resource_id").map(ResourceId::from_bytes))
        .transpose()
}

/// Flags currently true on one resource, by name.
pub(crate) fn flags_of(
    conn: &Connection,
    resource_id: ResourceId,
) -> Result<Vec<FlagName>, StorageError> {
    let mut stmt =
        conn.prepare("SELECT flag FROM resource_flags WHERE resource_id = ?1 ORDER BY flag")?;
    let rows = stmt.query_map(
        rusqlite::params![resource_id.as_bytes().as_slice()],
        |row| row.get::<_, String>(0),
    )?;
    let mut result = Vec::new();
    for row in rows {
        result.push(FlagName::new(row?)?);
    }
    Ok(result)
}

/// Every true flag in the store as (resource, flag) pairs.
pub(crate) fn all_flags(conn: &Connection) -> Result<Vec<(ResourceId, String)>, StorageError> {
    let mut stmt = conn.prepare("SELECT resource_id, flag FROM resource_flags")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut result = Vec::new();
    for row in rows {
        let (resource_id, flag) = row?;
        result.push((
            ResourceId::from_bytes(to_array::<16>(resource_id, "resource_id")?),
            flag,
        ));
    }
    Ok(result)
}

/// Clear `flag` on every resource of `parent_id` except `keep`.
/// Returns the resources that lost the flag.
pub(crate) fn clear_flag(
    conn: &Connection,
    parent_id: ParentId,
    flag: &FlagName,
    keep: Option<ResourceId>,
) -> Result<Vec<ResourceId>, StorageError> {
    let keep_bytes = keep.map(|id| id.as_bytes().to_vec());
    let mut stmt = conn.prepare(
        "DELETE FROM resource_flags
         WHERE parent_id = ?1 AND flag = ?2 AND (?3 IS NULL OR resource_id <> ?3)
         RETURNING resource_id",
    )?;
    let rows = stmt.query_map(
        rusqlite::params![parent_id.as_bytes().as_slice(), flag.as_str(), keep_bytes],
        |row| row.get::<_, Vec<u8>>(0),
    )?;
    let mut result = Vec::new();
    for row in rows {
        result.push(ResourceId::from_bytes(to_array::<16>(row?, "resource_id")?));
    }
    Ok(result)
}

/// Set `flag` on `resource_id`. A no-op if it is already set. Fails with a
/// constraint violation if another resource of the parent still holds it, and
/// with `OutOfScope` if the resource does not belong to `parent_id`.
pub(crate) fn set_flag(
    conn: &Connection,
    parent_id: ParentId,
    resource_id: ResourceId,
    flag: &FlagName,
) -> Result<bool, StorageError> {
    let already = conn
        .query_row(
            "SELECT 1 FROM resource_flags WHERE resource_id = ?1 AND flag = ?2 AND parent_id = ?3",
            rusqlite::params![
                resource_id.as_bytes().as_slice(),
                flag.as_str(),
                parent_id.as_bytes().as_slice(),
            ],
            |_| Ok(()),
        )
        .optional()?;
    if already.is_some() {
        return Ok(false);
    }
    let inserted = conn.execute(
        "INSERT INTO resource_flags (resource_id, parent_id, flag)
         SELECT resource_id, parent_id, ?3 FROM resources WHERE resource_id = ?1 AND parent_id = ?2",
        rusqlite::params![
            resource_id.as_bytes().as_slice(),
            parent_id.as_bytes().as_slice(),
            flag.as_str(),
        ],
    )?;
    if inserted == 0 {
        return Err(StorageError::OutOfScope {
            resource_id: resource_id.to_string(),
            parent_id: parent_id.to_string(),
        });
    }
    Ok(true)
}
