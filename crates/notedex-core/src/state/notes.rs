use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::error::{NotedexError, Result, StorageContext};
use crate::models::{
    CollectionId, Note, NoteId, NoteLink, NoteSummary, ProcessOutcome, ProcessedNote, TagCount,
    TitleIndexEntry,
};
use crate::text::normalize_title;

use super::collections::ensure_collection_exists;
use super::{
    DEFAULT_COLLECTION_PATH, SqliteStateStore, bool_to_i64, i64_to_u64_saturating,
    parse_required_rfc3339, system_collection_id, usize_to_i64_saturating,
};

const NOTE_SUMMARY_COLUMNS: &str = "n.id, n.title, n.collection_id, n.version, n.updated_at";

/// One note ready to persist: parsed, titled and hashed by the ingest pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteWrite {
    pub title: String,
    pub body: String,
    /// `None` lands the note in the default system collection.
    pub collection_id: Option<CollectionId>,
    /// Stable identity of the source document, e.g. its path inside an imported
    /// vault. Writes without one always create a new note.
    pub source_key: Option<String>,
    pub frontmatter: serde_json::Map<String, serde_json::Value>,
    pub content_hash: String,
    pub tags: Vec<String>,
    pub links: Vec<LinkWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkWrite {
    pub target_title: String,
    pub display_text: Option<String>,
    pub is_embed: bool,
    /// Id suggested by the title index. Checked against the notes table before use.
    pub target_hint: Option<NoteId>,
}

struct ExistingNote {
    id: NoteId,
    title: String,
    title_key: String,
    content_hash: String,
    collection_id: Option<CollectionId>,
}

impl SqliteStateStore {
    /// Creates a note, or updates the one sharing `source_key`, together with its
    /// metadata, tags and links in one transaction. Identical content for the
    /// same collection is left untouched. Titles never decide identity: two
    /// notes may share a normalized title.
    pub fn write_note(&self, write: &NoteWrite) -> Result<ProcessedNote> {
        let title_key = normalize_title(&write.title);
        if title_key.is_empty() {
            return Err(NotedexError::Validation(
                "note title must not be blank".to_string(),
            ));
        }
        let source_key = write
            .source_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        let bulk = self.bulk;
        self.with_tx(|tx| {
            let collection_id = match write.collection_id {
                Some(id) => {
                    ensure_collection_exists(tx, id)?;
                    id
                }
                None => system_collection_id(tx, DEFAULT_COLLECTION_PATH)?,
            };

            let existing = match source_key {
                Some(key) => note_by_source_key(tx, key)?,
                None => None,
            };

            let now = Utc::now().to_rfc3339();
            let mut replaced_title = None;
            let (note_id, outcome) = match existing {
                Some(current)
                    if current.content_hash == write.content_hash
                        && current.collection_id == Some(collection_id) =>
                {
                    debug!(note_id = current.id, "note content unchanged");
                    (current.id, ProcessOutcome::Unchanged)
                }
                Some(current) => {
                    let version_bump = i64::from(current.content_hash != write.content_hash);
                    tx.execute(
                        r"
                        UPDATE notes
                        SET title = ?1,
                            title_key = ?2,
                            body = ?3,
                            collection_id = ?4,
                            content_hash = ?5,
                            version = version + ?6,
                            updated_at = ?7
                        WHERE id = ?8
                        ",
                        params![
                            write.title,
                            title_key,
                            write.body,
                            collection_id,
                            write.content_hash,
                            version_bump,
                            now,
                            current.id
                        ],
                    )?;
                    clear_note_edges(tx, current.id)?;
                    if current.title_key != title_key {
                        retarget_incoming_links(tx, current.id)?;
                        resolve_pending_links(tx, current.id, &title_key)?;
                        replaced_title = Some(current.title);
                    }
                    (current.id, ProcessOutcome::Updated)
                }
                None => {
                    tx.execute(
                        r"
                        INSERT INTO notes(title, title_key, source_key, body, collection_id, content_hash, version, created_at, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
                        ",
                        params![
                            write.title,
                            title_key,
                            source_key,
                            write.body,
                            collection_id,
                            write.content_hash,
                            now
                        ],
                    )?;
                    let id = tx.last_insert_rowid();
                    resolve_pending_links(tx, id, &title_key)?;
                    (id, ProcessOutcome::Created)
                }
            };

            if outcome != ProcessOutcome::Unchanged {
                write_metadata(tx, bulk, note_id, &write.frontmatter)?;
                write_tags(tx, bulk, note_id, &write.tags)?;
                write_links(tx, bulk, note_id, &write.links)?;
            }
            info!(note_id, outcome = ?outcome, "note written");

            Ok(ProcessedNote {
                note_id,
                title: write.title.clone(),
                outcome,
                link_count: write.links.len(),
                tag_count: write.tags.len(),
                replaced_title,
            })
        })
        .storage_context("write_note", &write.title)
    }

    pub fn get_note(&self, id: NoteId) -> Result<Note> {
        self.with_conn(|conn| load_note(conn, id))
            .storage_context("get_note", id)
    }

    /// Relational lookup on the normalized title column.
    pub fn get_note_by_title(&self, title: &str) -> Result<Option<Note>> {
        self.with_conn(|conn| match note_id_by_key(conn, &normalize_title(title))? {
            Some(id) => load_note(conn, id).map(Some),
            None => Ok(None),
        })
        .storage_context("get_note_by_title", title)
    }

    pub fn find_note_id_by_title(&self, title: &str) -> Result<Option<NoteId>> {
        self.with_conn(|conn| note_id_by_key(conn, &normalize_title(title)))
            .storage_context("find_note_id_by_title", title)
    }

    /// `None` lists notes across every collection.
    pub fn list_notes(
        &self,
        collection_id: Option<CollectionId>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<NoteSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                r"
                SELECT {NOTE_SUMMARY_COLUMNS}
                FROM notes n
                WHERE ?1 IS NULL OR n.collection_id = ?1
                ORDER BY n.title_key ASC, n.id ASC
                LIMIT ?2 OFFSET ?3
                "
            ))?;
            let rows = stmt.query_map(
                params![
                    collection_id,
                    usize_to_i64_saturating(limit),
                    usize_to_i64_saturating(offset)
                ],
                summary_from_row,
            )?;
            collect_rows(rows)
        })
        .storage_context("list_notes", format!("{collection_id:?}"))
    }

    pub fn count_notes(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM notes", [], |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(i64_to_u64_saturating(count))
        })
    }

    /// Removes the note with its metadata, tags, outgoing links and every link
    /// pointing at it. The search shadow goes with it through the delete trigger.
    pub fn delete_note(&self, id: NoteId) -> Result<NoteSummary> {
        self.with_tx(|tx| {
            let summary = load_summary(tx, id)?;
            clear_note_edges(tx, id)?;
            let incoming = tx.execute("DELETE FROM note_links WHERE target_id = ?1", params![id])?;
            tx.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
            info!(note_id = id, incoming_links = incoming, "note deleted");
            Ok(summary)
        })
        .storage_context("delete_note", id)
    }

    pub fn move_note(&self, id: NoteId, collection_id: CollectionId) -> Result<NoteSummary> {
        self.with_tx(|tx| {
            ensure_collection_exists(tx, collection_id)?;
            let changed = tx.execute(
                "UPDATE notes SET collection_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![collection_id, Utc::now().to_rfc3339(), id],
            )?;
            if changed == 0 {
                return Err(NotedexError::NotFound(format!("note {id}")));
            }
            load_summary(tx, id)
        })
        .storage_context("move_note", id)
    }

    pub fn outgoing_links(&self, id: NoteId) -> Result<Vec<NoteLink>> {
        self.with_conn(|conn| {
            ensure_note_exists(conn, id)?;
            let mut stmt = conn.prepare(
                r"
                SELECT source_id, target_key, target_id, display_text, is_embed, position
                FROM note_links
                WHERE source_id = ?1
                ORDER BY position ASC
                ",
            )?;
            let rows = stmt.query_map(params![id], link_from_row)?;
            collect_rows(rows)
        })
        .storage_context("outgoing_links", id)
    }

    pub fn backlinks(&self, id: NoteId) -> Result<Vec<NoteLink>> {
        self.with_conn(|conn| {
            ensure_note_exists(conn, id)?;
            let mut stmt = conn.prepare(
                r"
                SELECT source_id, target_key, target_id, display_text, is_embed, position
                FROM note_links
                WHERE target_id = ?1
                ORDER BY source_id ASC, position ASC
                ",
            )?;
            let rows = stmt.query_map(params![id], link_from_row)?;
            collect_rows(rows)
        })
        .storage_context("backlinks", id)
    }

    pub fn notes_with_tag(&self, tag: &str) -> Result<Vec<NoteSummary>> {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                r"
                SELECT {NOTE_SUMMARY_COLUMNS}
                FROM notes n
                JOIN note_tags t ON t.note_id = n.id
                WHERE t.tag = ?1
                ORDER BY n.title_key ASC, n.id ASC
                "
            ))?;
            let rows = stmt.query_map(params![tag], summary_from_row)?;
            collect_rows(rows)
        })
        .storage_context("notes_with_tag", &tag)
    }

    /// Every tag in use with its note count, most used first.
    pub fn list_tags(&self) -> Result<Vec<TagCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT tag, COUNT(*) AS note_count
                FROM note_tags
                GROUP BY tag
                ORDER BY note_count DESC, tag ASC
                ",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(TagCount {
                    tag: row.get(0)?,
                    note_count: row.get(1)?,
                })
            })?;
            collect_rows(rows)
        })
        .storage_context("list_tags", "note_tags")
    }

    /// One entry per normalized title, pointing at the oldest note holding it.
    pub fn title_index_entries(&self) -> Result<Vec<TitleIndexEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT title_key, MIN(id)
                FROM notes
                GROUP BY title_key
                ORDER BY title_key ASC
                ",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(TitleIndexEntry {
                    key: row.get(0)?,
                    note_id: row.get(1)?,
                })
            })?;
            collect_rows(rows)
        })
        .storage_context("title_index_entries", "notes")
    }
}

fn write_metadata(
    conn: &Connection,
    bulk: crate::bulk::BulkWriter,
    note_id: NoteId,
    frontmatter: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    let mut rows = Vec::with_capacity(frontmatter.len());
    for (key, value) in frontmatter {
        rows.push(vec![
            Value::Integer(note_id),
            Value::Text(key.clone()),
            Value::Text(serde_json::to_string(value)?),
        ]);
    }
    bulk.upsert(
        conn,
        "note_metadata",
        &["note_id", "key", "value_json"],
        &rows,
        &["note_id", "key"],
        &["value_json"],
    )?;
    Ok(())
}

fn write_tags(
    conn: &Connection,
    bulk: crate::bulk::BulkWriter,
    note_id: NoteId,
    tags: &[String],
) -> Result<()> {
    let rows = tags
        .iter()
        .map(|tag| vec![Value::Integer(note_id), Value::Text(tag.clone())])
        .collect::<Vec<_>>();
    bulk.upsert(
        conn,
        "note_tags",
        &["note_id", "tag"],
        &rows,
        &["note_id", "tag"],
        &[],
    )?;
    Ok(())
}

fn write_links(
    conn: &Connection,
    bulk: crate::bulk::BulkWriter,
    note_id: NoteId,
    links: &[LinkWrite],
) -> Result<()> {
    let mut rows = Vec::with_capacity(links.len());
    for (position, link) in links.iter().enumerate() {
        let target_key = normalize_title(&link.target_title);
        if target_key.is_empty() {
            continue;
        }
        let target_id = resolve_target(conn, &target_key, link.target_hint)?;
        rows.push(vec![
            Value::Integer(note_id),
            Value::Text(target_key),
            Value::Integer(bool_to_i64(link.is_embed)),
            target_id.map_or(Value::Null, Value::Integer),
            link.display_text.clone().map_or(Value::Null, Value::Text),
            Value::Integer(usize_to_i64_saturating(position)),
        ]);
    }
    bulk.upsert(
        conn,
        "note_links",
        &[
            "source_id",
            "target_key",
            "is_embed",
            "target_id",
            "display_text",
            "position",
        ],
        &rows,
        &["source_id", "target_key", "is_embed"],
        &["target_id", "display_text", "position"],
    )?;
    Ok(())
}

/// Trusts the index hint only when the notes table agrees with it.
fn resolve_target(
    conn: &Connection,
    target_key: &str,
    hint: Option<NoteId>,
) -> Result<Option<NoteId>> {
    if let Some(hint) = hint {
        let confirmed = conn
            .query_row(
                "SELECT 1 FROM notes WHERE id = ?1 AND title_key = ?2",
                params![hint, target_key],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if confirmed {
            return Ok(Some(hint));
        }
        debug!(target_key, hint, "discarding stale title index hint");
    }
    note_id_by_key(conn, target_key)
}

fn note_by_source_key(conn: &Connection, source_key: &str) -> Result<Option<ExistingNote>> {
    let note = conn
        .query_row(
            r"
            SELECT id, title, title_key, content_hash, collection_id
            FROM notes
            WHERE source_key = ?1
            ",
            params![source_key],
            |row| {
                Ok(ExistingNote {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    title_key: row.get(2)?,
                    content_hash: row.get(3)?,
                    collection_id: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(note)
}

/// Links still waiting for `title_key` now point at `note_id`. Links already
/// resolved to an older holder of the same title keep their target.
fn resolve_pending_links(conn: &Connection, note_id: NoteId, title_key: &str) -> Result<()> {
    let resolved = conn.execute(
        "UPDATE note_links SET target_id = ?1 WHERE target_key = ?2 AND target_id IS NULL",
        params![note_id, title_key],
    )?;
    if resolved > 0 {
        debug!(note_id, resolved, "pending links resolved");
    }
    Ok(())
}

/// After a retitle, links that targeted `note_id` by its old title move to the
/// oldest remaining holder of that title, or back to pending.
fn retarget_incoming_links(conn: &Connection, note_id: NoteId) -> Result<()> {
    let moved = conn.execute(
        r"
        UPDATE note_links
        SET target_id = (
            SELECT MIN(n.id) FROM notes n WHERE n.title_key = note_links.target_key
        )
        WHERE target_id = ?1
        ",
        params![note_id],
    )?;
    if moved > 0 {
        debug!(note_id, moved, "incoming links retargeted after retitle");
    }
    Ok(())
}

fn clear_note_edges(conn: &Connection, note_id: NoteId) -> Result<()> {
    conn.execute("DELETE FROM note_metadata WHERE note_id = ?1", params![note_id])?;
    conn.execute("DELETE FROM note_tags WHERE note_id = ?1", params![note_id])?;
    conn.execute("DELETE FROM note_links WHERE source_id = ?1", params![note_id])?;
    Ok(())
}

fn note_id_by_key(conn: &Connection, title_key: &str) -> Result<Option<NoteId>> {
    if title_key.is_empty() {
        return Ok(None);
    }
    let id = conn
        .query_row(
            "SELECT id FROM notes WHERE title_key = ?1 ORDER BY id ASC LIMIT 1",
            params![title_key],
            |row| row.get::<_, NoteId>(0),
        )
        .optional()?;
    Ok(id)
}

fn ensure_note_exists(conn: &Connection, id: NoteId) -> Result<()> {
    load_summary(conn, id).map(|_| ())
}

fn load_summary(conn: &Connection, id: NoteId) -> Result<NoteSummary> {
    conn.query_row(
        &format!("SELECT {NOTE_SUMMARY_COLUMNS} FROM notes n WHERE n.id = ?1"),
        params![id],
        summary_from_row,
    )
    .optional()?
    .ok_or_else(|| NotedexError::NotFound(format!("note {id}")))
}

fn load_note(conn: &Connection, id: NoteId) -> Result<Note> {
    let note = conn
        .query_row(
            r"
            SELECT id, title, body, collection_id, content_hash, version, created_at, updated_at
            FROM notes
            WHERE id = ?1
            ",
            params![id],
            |row| {
                let created_raw = row.get::<_, String>(6)?;
                let updated_raw = row.get::<_, String>(7)?;
                Ok(Note {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    body: row.get(2)?,
                    collection_id: row.get(3)?,
                    frontmatter: serde_json::Map::new(),
                    content_hash: row.get(4)?,
                    version: row.get(5)?,
                    created_at: parse_required_rfc3339(6, &created_raw)?,
                    updated_at: parse_required_rfc3339(7, &updated_raw)?,
                })
            },
        )
        .optional()?;
    let Some(mut note) = note else {
        return Err(NotedexError::NotFound(format!("note {id}")));
    };

    let mut stmt = conn.prepare(
        "SELECT key, value_json FROM note_metadata WHERE note_id = ?1 ORDER BY key ASC",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut metadata = BTreeMap::new();
    for row in rows {
        let (key, raw) = row?;
        metadata.insert(key, serde_json::from_str::<serde_json::Value>(&raw)?);
    }
    note.frontmatter = metadata.into_iter().collect();
    Ok(note)
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<NoteSummary> {
    let updated_raw = row.get::<_, String>(4)?;
    Ok(NoteSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        collection_id: row.get(2)?,
        version: row.get(3)?,
        updated_at: parse_required_rfc3339(4, &updated_raw)?,
    })
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<NoteLink> {
    Ok(NoteLink {
        source_id: row.get(0)?,
        target_key: row.get(1)?,
        target_id: row.get(2)?,
        display_text: row.get(3)?,
        is_embed: row.get::<_, i64>(4)? != 0,
        position: row.get(5)?,
    })
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
