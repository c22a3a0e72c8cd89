use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use crate::error::{NotedexError, Result};

use super::{DEFAULT_COLLECTION_PATH, INBOX_COLLECTION_PATH, SqliteStateStore};

pub(crate) const NOTES_FTS_TABLE: &str = "notes_fts";

/// Sync triggers keeping `notes_fts` in step with `notes`. The search engine
/// relies on all three existing.
pub(crate) const NOTES_FTS_TRIGGERS: [&str; 3] = ["notes_fts_ai", "notes_fts_ad", "notes_fts_au"];

const MIGRATION_SCHEMA_SQL: &str = r"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS collections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        parent_id INTEGER REFERENCES collections(id),
        path TEXT NOT NULL UNIQUE,
        description TEXT,
        position INTEGER NOT NULL DEFAULT 0,
        is_system INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        title_key TEXT NOT NULL,
        source_key TEXT,
        body TEXT NOT NULL,
        collection_id INTEGER REFERENCES collections(id),
        content_hash TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS note_metadata (
        note_id INTEGER NOT NULL,
        key TEXT NOT NULL,
        value_json TEXT NOT NULL,
        PRIMARY KEY (note_id, key),
        FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS note_tags (
        note_id INTEGER NOT NULL,
        tag TEXT NOT NULL,
        PRIMARY KEY (note_id, tag),
        FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS note_links (
        source_id INTEGER NOT NULL,
        target_key TEXT NOT NULL,
        is_embed INTEGER NOT NULL DEFAULT 0,
        target_id INTEGER,
        display_text TEXT,
        position INTEGER NOT NULL,
        PRIMARY KEY (source_id, target_key, is_embed),
        FOREIGN KEY (source_id) REFERENCES notes(id) ON DELETE CASCADE,
        FOREIGN KEY (target_id) REFERENCES notes(id) ON DELETE SET NULL
    );

    CREATE INDEX IF NOT EXISTS idx_collections_parent
    ON collections(parent_id, position, name);
    CREATE INDEX IF NOT EXISTS idx_notes_title_key ON notes(title_key);
    CREATE INDEX IF NOT EXISTS idx_notes_collection ON notes(collection_id);
    CREATE INDEX IF NOT EXISTS idx_note_tags_tag ON note_tags(tag);
    CREATE INDEX IF NOT EXISTS idx_note_links_target_id ON note_links(target_id);
    CREATE INDEX IF NOT EXISTS idx_note_links_target_key ON note_links(target_key);
";

/// Applied after the column check so databases created before `source_key`
/// existed gain the column first.
const NOTES_SOURCE_KEY_INDEX_SQL: &str = r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_notes_source_key
    ON notes(source_key) WHERE source_key IS NOT NULL;
";

const NOTES_FTS_SQL: &str = r"
    CREATE VIRTUAL TABLE notes_fts
    USING fts5(
        title,
        body,
        content='notes',
        content_rowid='id',
        tokenize='unicode61 remove_diacritics 2'
    );
";

const NOTES_FTS_TRIGGERS_SQL: &str = r"
    CREATE TRIGGER IF NOT EXISTS notes_fts_ai AFTER INSERT ON notes BEGIN
        INSERT INTO notes_fts(rowid, title, body) VALUES (new.id, new.title, new.body);
    END;

    CREATE TRIGGER IF NOT EXISTS notes_fts_ad AFTER DELETE ON notes BEGIN
        INSERT INTO notes_fts(notes_fts, rowid, title, body)
        VALUES ('delete', old.id, old.title, old.body);
    END;

    CREATE TRIGGER IF NOT EXISTS notes_fts_au AFTER UPDATE ON notes BEGIN
        INSERT INTO notes_fts(notes_fts, rowid, title, body)
        VALUES ('delete', old.id, old.title, old.body);
        INSERT INTO notes_fts(rowid, title, body) VALUES (new.id, new.title, new.body);
    END;
";

const SYSTEM_COLLECTIONS: [(&str, &str, &str, i64); 2] = [
    (
        "Default",
        DEFAULT_COLLECTION_PATH,
        "Notes ingested without an explicit collection",
        0,
    ),
    ("Inbox", INBOX_COLLECTION_PATH, "Unsorted incoming notes", 1),
];

impl SqliteStateStore {
    pub fn migrate(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| NotedexError::mutex_poisoned("sqlite"))?;
        conn.execute_batch(MIGRATION_SCHEMA_SQL)?;
        ensure_required_column(
            &conn,
            "notes",
            "title_key",
            "unsupported notes schema: title_key is missing; reset the state database",
        )?;
        if !has_column(&conn, "notes", "source_key")? {
            conn.execute_batch("ALTER TABLE notes ADD COLUMN source_key TEXT")?;
            info!("notes.source_key column added");
        }
        conn.execute_batch(NOTES_SOURCE_KEY_INDEX_SQL)?;
        ensure_required_column(
            &conn,
            "collections",
            "is_system",
            "unsupported collections schema: is_system is missing; reset the state database",
        )?;

        if !has_table(&conn, NOTES_FTS_TABLE)? {
            conn.execute_batch(NOTES_FTS_SQL)?;
            conn.execute(
                "INSERT INTO notes_fts(notes_fts) VALUES ('rebuild')",
                [],
            )?;
            info!("full-text table created and populated from notes");
        }
        let missing_triggers = missing_fts_triggers(&conn)?;
        if !missing_triggers.is_empty() {
            if missing_triggers.len() < NOTES_FTS_TRIGGERS.len() {
                warn!(missing = ?missing_triggers, "recreating dropped full-text sync triggers");
            }
            conn.execute_batch(NOTES_FTS_TRIGGERS_SQL)?;
            conn.execute(
                "INSERT INTO notes_fts(notes_fts) VALUES ('rebuild')",
                [],
            )?;
        }

        seed_system_collections(&conn)?;
        drop(conn);
        Ok(())
    }
}

fn seed_system_collections(conn: &Connection) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    for (name, path, description, position) in SYSTEM_COLLECTIONS {
        conn.execute(
            r"
            INSERT INTO collections(name, parent_id, path, description, position, is_system, created_at, updated_at)
            VALUES (?1, NULL, ?2, ?3, ?4, 1, ?5, ?5)
            ON CONFLICT(path) DO UPDATE SET is_system = 1
            ",
            params![name, path, description, position, now],
        )?;
    }
    Ok(())
}

pub(crate) fn missing_fts_triggers(conn: &Connection) -> Result<Vec<&'static str>> {
    let mut missing = Vec::new();
    for trigger in NOTES_FTS_TRIGGERS {
        let exists = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'trigger' AND name = ?1 LIMIT 1",
                params![trigger],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            missing.push(trigger);
        }
    }
    Ok(missing)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for row in rows {
        if row? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn has_table(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1",
            params![table],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(exists)
}

fn ensure_required_column(
    conn: &Connection,
    table: &str,
    column: &str,
    error_message: &'static str,
) -> Result<()> {
    if has_column(conn, table, column)? {
        Ok(())
    } else {
        Err(NotedexError::Validation(error_message.to_string()))
    }
}
