use std::path::Path;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::bulk::BulkWriter;
use crate::error::{NotedexError, Result};
use crate::models::CollectionId;

mod collections;
mod migration;
mod notes;

pub use notes::{LinkWrite, NoteWrite};

/// Path of the collection that owns notes ingested without an explicit target.
pub const DEFAULT_COLLECTION_PATH: &str = "default";
pub const INBOX_COLLECTION_PATH: &str = "inbox";

#[derive(Clone)]
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
    bulk: BulkWriter,
}

impl std::fmt::Debug for SqliteStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateStore")
            .field("bulk", &self.bulk)
            .finish_non_exhaustive()
    }
}

impl SqliteStateStore {
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| NotedexError::mutex_poisoned("sqlite"))?;
        f(&conn)
    }

    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| NotedexError::mutex_poisoned("sqlite"))?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        drop(conn);
        Ok(value)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_writer(path, BulkWriter::default())
    }

    pub fn open_with_writer(path: impl AsRef<Path>, bulk: BulkWriter) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            bulk,
        };
        store.migrate()?;
        #[cfg(unix)]
        harden_sqlite_permissions(path)?;
        info!(path = %path.display(), batch_size = bulk.batch_size(), "state store opened");
        Ok(store)
    }

    #[must_use]
    pub const fn bulk_writer(&self) -> BulkWriter {
        self.bulk
    }

    pub fn default_collection_id(&self) -> Result<CollectionId> {
        self.with_conn(|conn| system_collection_id(conn, DEFAULT_COLLECTION_PATH))
    }

    pub fn inbox_collection_id(&self) -> Result<CollectionId> {
        self.with_conn(|conn| system_collection_id(conn, INBOX_COLLECTION_PATH))
    }
}

fn system_collection_id(conn: &Connection, path: &str) -> Result<CollectionId> {
    conn.query_row(
        "SELECT id FROM collections WHERE path = ?1 AND is_system = 1",
        params![path],
        |row| row.get::<_, CollectionId>(0),
    )
    .optional()?
    .ok_or_else(|| NotedexError::Internal(format!("system collection {path} is missing")))
}

fn parse_required_rfc3339(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|x| x.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn bool_to_i64(value: bool) -> i64 {
    i64::from(u8::from(value))
}

fn usize_to_i64_saturating(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn i64_to_u64_saturating(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Maps a UNIQUE violation to `Conflict`; everything else passes through.
fn conflict_on_unique(err: rusqlite::Error, message: impl FnOnce() -> String) -> NotedexError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            NotedexError::Conflict(message())
        }
        _ => NotedexError::Sqlite(err),
    }
}

#[cfg(unix)]
fn harden_sqlite_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for suffix in ["", "-wal", "-shm"] {
        let mut os = path.as_os_str().to_os_string();
        os.push(suffix);
        let candidate = PathBuf::from(os);
        if candidate.exists() {
            std::fs::set_permissions(candidate, std::fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(())
}
