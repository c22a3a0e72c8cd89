use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::error::{NotedexError, Result, StorageContext};
use crate::models::{Collection, CollectionId, CollectionUpdate};
use crate::text::sanitize_path_component;

use super::{
    SqliteStateStore, conflict_on_unique, i64_to_u64_saturating,
    parse_required_rfc3339, usize_to_i64_saturating,
};

const COLLECTION_COLUMNS: &str =
    "id, name, parent_id, path, description, position, is_system, created_at, updated_at";

impl SqliteStateStore {
    pub fn create_collection(
        &self,
        name: &str,
        parent_id: Option<CollectionId>,
        description: Option<&str>,
        position: i64,
    ) -> Result<Collection> {
        let (name, component) = validate_collection_name(name)?;
        self.with_tx(|tx| {
            let path = match parent_id {
                Some(parent_id) => {
                    let parent = load_collection(tx, parent_id)?;
                    format!("{}/{component}", parent.path)
                }
                None => component,
            };
            ensure_path_free(tx, &path, None)?;

            let now = Utc::now().to_rfc3339();
            tx.execute(
                r"
                INSERT INTO collections(name, parent_id, path, description, position, is_system, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
                ",
                params![name, parent_id, path, description, position, now],
            )
            .map_err(|err| conflict_on_unique(err, || path_taken_message(&path)))?;
            let id = tx.last_insert_rowid();
            info!(collection_id = id, path = %path, "collection created");
            load_collection(tx, id)
        })
        .storage_context("create_collection", name)
    }

    pub fn get_collection(&self, id: CollectionId) -> Result<Collection> {
        self.with_conn(|conn| load_collection(conn, id))
            .storage_context("get_collection", id)
    }

    pub fn get_collection_by_path(&self, path: &str) -> Result<Collection> {
        let path = path.trim().trim_matches('/');
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE path = ?1"),
                params![path],
                collection_from_row,
            )
            .optional()?
            .ok_or_else(|| NotedexError::NotFound(format!("collection path {path}")))
        })
        .storage_context("get_collection_by_path", path)
    }

    /// Direct children ordered by position, then name. `None` lists root collections.
    pub fn list_children(
        &self,
        parent_id: Option<CollectionId>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Collection>> {
        self.with_conn(|conn| {
            if let Some(parent_id) = parent_id {
                ensure_collection_exists(conn, parent_id)?;
            }
            let mut stmt = conn.prepare(&format!(
                r"
                SELECT {COLLECTION_COLUMNS}
                FROM collections
                WHERE parent_id IS ?1
                ORDER BY position ASC, name ASC, id ASC
                LIMIT ?2 OFFSET ?3
                "
            ))?;
            let rows = stmt.query_map(
                params![
                    parent_id,
                    usize_to_i64_saturating(limit),
                    usize_to_i64_saturating(offset)
                ],
                collection_from_row,
            )?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .storage_context("list_children", format_parent(parent_id))
    }

    pub fn count_children(&self, parent_id: Option<CollectionId>) -> Result<u64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM collections WHERE parent_id IS ?1",
                params![parent_id],
                |row| row.get::<_, i64>(0),
            )?;
            Ok(i64_to_u64_saturating(count))
        })
        .storage_context("count_children", format_parent(parent_id))
    }

    /// The root and its descendants in tree pre-order, each tagged with its
    /// depth below the root. `max_depth == 0` walks the whole subtree. Rows
    /// carry no timestamps.
    pub fn get_subtree(&self, root_id: CollectionId, max_depth: u32) -> Result<Vec<Collection>> {
        self.with_conn(|conn| {
            ensure_collection_exists(conn, root_id)?;
            let mut stmt = conn.prepare(
                r"
                WITH RECURSIVE subtree(id, depth) AS (
                    SELECT id, 0 FROM collections WHERE id = ?1
                    UNION ALL
                    SELECT c.id, s.depth + 1
                    FROM collections c
                    JOIN subtree s ON c.parent_id = s.id
                    WHERE ?2 = 0 OR s.depth < ?2
                )
                SELECT c.id, c.name, c.parent_id, c.path, c.description, c.position, c.is_system, s.depth
                FROM subtree s
                JOIN collections c ON c.id = s.id
                ORDER BY replace(c.path, '/', char(1)) ASC
                ",
            )?;
            let rows = stmt.query_map(params![root_id, i64::from(max_depth)], |row| {
                Ok(Collection {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    parent_id: row.get(2)?,
                    path: row.get(3)?,
                    description: row.get(4)?,
                    position: row.get(5)?,
                    is_system: row.get::<_, i64>(6)? != 0,
                    depth: Some(u32::try_from(row.get::<_, i64>(7)?).unwrap_or(u32::MAX)),
                    created_at: None,
                    updated_at: None,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .storage_context("get_subtree", root_id)
    }

    /// Replaces name, parent, description and position. A rename or reparent
    /// rewrites this node's path and every descendant path in the same transaction.
    pub fn update_collection(
        &self,
        id: CollectionId,
        update: &CollectionUpdate,
    ) -> Result<Collection> {
        let (name, component) = validate_collection_name(&update.name)?;
        self.with_tx(|tx| {
            let current = load_collection(tx, id)?;
            let renamed = name != current.name;
            let reparented = update.parent_id != current.parent_id;
            if current.is_system && (renamed || reparented) {
                return Err(NotedexError::PermissionDenied(format!(
                    "system collection {} cannot be renamed or moved",
                    current.path
                )));
            }

            let new_path = match update.parent_id {
                Some(parent_id) => {
                    if parent_id == id {
                        return Err(NotedexError::Validation(format!(
                            "collection {id} cannot be its own parent"
                        )));
                    }
                    let parent = load_collection(tx, parent_id)?;
                    if is_descendant_path(&parent.path, &current.path) {
                        return Err(NotedexError::Validation(format!(
                            "collection {} cannot move under its descendant {}",
                            current.path, parent.path
                        )));
                    }
                    format!("{}/{component}", parent.path)
                }
                None => component,
            };

            let now = Utc::now().to_rfc3339();
            if new_path != current.path {
                ensure_path_free(tx, &new_path, Some(id))?;
                tx.execute(
                    "UPDATE collections SET path = ?1, updated_at = ?2 WHERE id = ?3",
                    params![new_path, now, id],
                )
                .map_err(|err| conflict_on_unique(err, || path_taken_message(&new_path)))?;
                let cascaded = tx
                    .execute(
                        r"
                        UPDATE collections
                        SET path = ?1 || substr(path, length(?2) + 1),
                            updated_at = ?3
                        WHERE substr(path, 1, length(?2) + 1) = ?2 || '/'
                        ",
                        params![new_path, current.path, now],
                    )
                    .map_err(|err| conflict_on_unique(err, || path_taken_message(&new_path)))?;
                info!(
                    collection_id = id,
                    old_path = %current.path,
                    new_path = %new_path,
                    descendants = cascaded,
                    "collection path regenerated"
                );
            }

            tx.execute(
                r"
                UPDATE collections
                SET name = ?1, parent_id = ?2, description = ?3, position = ?4, updated_at = ?5
                WHERE id = ?6
                ",
                params![
                    name,
                    update.parent_id,
                    update.description,
                    update.position,
                    now,
                    id
                ],
            )?;
            load_collection(tx, id)
        })
        .storage_context("update_collection", id)
    }

    /// Refuses system collections and collections that still own notes or children.
    pub fn delete_collection(&self, id: CollectionId) -> Result<()> {
        self.with_tx(|tx| {
            let current = load_collection(tx, id)?;
            if current.is_system {
                return Err(NotedexError::PermissionDenied(format!(
                    "system collection {} cannot be deleted",
                    current.path
                )));
            }
            let notes = collection_note_count(tx, id)?;
            if notes > 0 {
                return Err(NotedexError::FailedPrecondition(format!(
                    "collection {} still owns {notes} note(s); move or delete them first",
                    current.path
                )));
            }
            let children: i64 = tx.query_row(
                "SELECT COUNT(*) FROM collections WHERE parent_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if children > 0 {
                return Err(NotedexError::FailedPrecondition(format!(
                    "collection {} still has {children} child collection(s)",
                    current.path
                )));
            }
            tx.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
            info!(collection_id = id, path = %current.path, "collection deleted");
            Ok(())
        })
        .storage_context("delete_collection", id)
    }

    /// Notes directly assigned to the collection, not counting descendants.
    pub fn count_collection_notes(&self, id: CollectionId) -> Result<u64> {
        self.with_conn(|conn| {
            ensure_collection_exists(conn, id)?;
            collection_note_count(conn, id)
        })
        .storage_context("count_collection_notes", id)
    }
}

pub(super) fn ensure_collection_exists(conn: &Connection, id: CollectionId) -> Result<()> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM collections WHERE id = ?1",
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(NotedexError::NotFound(format!("collection {id}")))
    }
}

fn load_collection(conn: &Connection, id: CollectionId) -> Result<Collection> {
    conn.query_row(
        &format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?1"),
        params![id],
        collection_from_row,
    )
    .optional()?
    .ok_or_else(|| NotedexError::NotFound(format!("collection {id}")))
}

fn collection_note_count(conn: &Connection, id: CollectionId) -> Result<u64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notes WHERE collection_id = ?1",
        params![id],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(i64_to_u64_saturating(count))
}

fn ensure_path_free(conn: &Connection, path: &str, except: Option<CollectionId>) -> Result<()> {
    let holder = conn
        .query_row(
            "SELECT id FROM collections WHERE path = ?1",
            params![path],
            |row| row.get::<_, CollectionId>(0),
        )
        .optional()?;
    match holder {
        Some(holder) if Some(holder) != except => {
            debug!(path, holder, "collection path collision");
            Err(NotedexError::Conflict(path_taken_message(path)))
        }
        _ => Ok(()),
    }
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<Collection> {
    let created_raw = row.get::<_, String>(7)?;
    let updated_raw = row.get::<_, String>(8)?;
    Ok(Collection {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        path: row.get(3)?,
        description: row.get(4)?,
        position: row.get(5)?,
        is_system: row.get::<_, i64>(6)? != 0,
        depth: None,
        created_at: Some(parse_required_rfc3339(7, &created_raw)?),
        updated_at: Some(parse_required_rfc3339(8, &updated_raw)?),
    })
}

/// Trimmed display name plus its path component.
fn validate_collection_name(name: &str) -> Result<(String, String)> {
    let name = name.trim();
    let component = sanitize_path_component(name).ok_or_else(|| {
        NotedexError::Validation(format!(
            "collection name {name:?} has no usable path characters"
        ))
    })?;
    Ok((name.to_string(), component))
}

fn is_descendant_path(candidate: &str, ancestor: &str) -> bool {
    candidate
        .strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn path_taken_message(path: &str) -> String {
    format!("collection path {path} already exists")
}

fn format_parent(parent_id: Option<CollectionId>) -> String {
    parent_id.map_or_else(|| "root".to_string(), |id| id.to_string())
}
