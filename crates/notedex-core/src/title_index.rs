//! Persistent normalized-title → note id map.
//!
//! Backed by an embedded sled tree living outside the relational schema. It
//! is a derived cache: every entry can be recomputed from the notes table,
//! and a miss only means "not indexed yet".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{NotedexError, Result};
use crate::models::NoteId;
use crate::text::normalize_title;

#[derive(Clone)]
pub struct TitleIndex {
    db: sled::Db,
    path: PathBuf,
}

impl std::fmt::Debug for TitleIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TitleIndex")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl TitleIndex {
    /// Opens (creating if absent) the index directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        let db = sled::open(&path)?;
        info!(path = %path.display(), entries = db.len(), "title index opened");
        Ok(Self { db, path })
    }

    /// Throwaway index that never touches disk beyond a temp location.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            path: PathBuf::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set(&self, title: &str, id: NoteId) -> Result<()> {
        let key = index_key(title)?;
        self.db.insert(key.as_bytes(), &encode_id(id)[..])?;
        Ok(())
    }

    /// `None` is a normal outcome, not an error.
    pub fn get(&self, title: &str) -> Result<Option<NoteId>> {
        let key = normalize_title(title);
        if key.is_empty() {
            return Ok(None);
        }
        self.db
            .get(key.as_bytes())?
            .map(|raw| decode_id(&key, &raw))
            .transpose()
    }

    pub fn delete(&self, title: &str) -> Result<()> {
        let key = normalize_title(title);
        if key.is_empty() {
            return Ok(());
        }
        self.db.remove(key.as_bytes())?;
        Ok(())
    }

    /// Applies every entry atomically. Titles colliding after normalization keep
    /// the last id given for them.
    pub fn batch_set<'a, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, NoteId)>,
    {
        let mut batch = sled::Batch::default();
        let mut count = 0usize;
        for (title, id) in entries {
            let key = index_key(title)?;
            batch.insert(key.as_bytes(), &encode_id(id)[..]);
            count += 1;
        }
        if count > 0 {
            self.db.apply_batch(batch)?;
        }
        debug!(entries = count, "title index batch set");
        Ok(count)
    }

    pub fn batch_delete<'a, I>(&self, titles: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut batch = sled::Batch::default();
        let mut count = 0usize;
        for title in titles {
            let key = normalize_title(title);
            if key.is_empty() {
                continue;
            }
            batch.remove(key.as_bytes());
            count += 1;
        }
        if count > 0 {
            self.db.apply_batch(batch)?;
        }
        debug!(entries = count, "title index batch delete");
        Ok(count)
    }

    /// Snapshot of every entry keyed by normalized title.
    pub fn get_all(&self) -> Result<BTreeMap<String, NoteId>> {
        let mut out = BTreeMap::new();
        for item in self.db.iter() {
            let (raw_key, raw_value) = item?;
            let key = String::from_utf8(raw_key.to_vec()).map_err(|err| {
                NotedexError::Internal(format!("title index key is not UTF-8: {err}"))
            })?;
            let id = decode_id(&key, &raw_value)?;
            out.insert(key, id);
        }
        Ok(out)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.db.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Drops every entry. Only meant to precede a full rebuild.
    pub fn clear(&self) -> Result<()> {
        self.db.clear()?;
        info!(path = %self.path.display(), "title index cleared");
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Flushes pending writes. Entries written after the last flush may be lost
    /// if the process exits without closing.
    pub fn close(self) -> Result<()> {
        let flushed = self.db.flush()?;
        debug!(path = %self.path.display(), flushed, "title index closed");
        Ok(())
    }
}

fn index_key(title: &str) -> Result<String> {
    let key = normalize_title(title);
    if key.is_empty() {
        return Err(NotedexError::Validation(
            "title index key must not be blank".to_string(),
        ));
    }
    Ok(key)
}

fn encode_id(id: NoteId) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_id(key: &str, raw: &[u8]) -> Result<NoteId> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| {
        NotedexError::Internal(format!(
            "title index value for {key:?} has {} bytes, expected 8",
            raw.len()
        ))
    })?;
    Ok(NoteId::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn differently_formatted_titles_share_one_entry() {
        let index = TitleIndex::temporary().expect("open");
        index.set("  Other   NOTE ", 42).expect("set");
        assert_eq!(index.get("other note").expect("get"), Some(42));
        assert_eq!(index.get("OTHER\tnote").expect("get"), Some(42));
        assert_eq!(index.len(), 1);

        index.set("other note", 43).expect("overwrite");
        assert_eq!(index.get("Other Note").expect("get"), Some(43));
    }

    #[test]
    fn missing_and_blank_titles_are_absent_not_errors() {
        let index = TitleIndex::temporary().expect("open");
        assert_eq!(index.get("nothing here").expect("get"), None);
        assert_eq!(index.get("   ").expect("get"), None);
        index.delete("nothing here").expect("delete missing");
        assert!(index.set("  ", 1).is_err());
    }

    #[test]
    fn batch_operations_apply_together() {
        let index = TitleIndex::temporary().expect("open");
        let written = index
            .batch_set([("Alpha", 1), ("Beta", 2), ("Gamma", 3)])
            .expect("batch set");
        assert_eq!(written, 3);
        assert_eq!(index.len(), 3);

        let removed = index.batch_delete(["ALPHA", "gamma", " "]).expect("batch delete");
        assert_eq!(removed, 2);
        let all = index.get_all().expect("all");
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("beta"), Some(&2));
    }

    #[test]
    fn batch_set_rejects_blank_titles_without_partial_writes() {
        let index = TitleIndex::temporary().expect("open");
        let err = index
            .batch_set([("Alpha", 1), ("   ", 2)])
            .expect_err("blank title");
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(index.is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let index = TitleIndex::temporary().expect("open");
        index.batch_set([("a", 1), ("b", 2)]).expect("seed");
        index.clear().expect("clear");
        assert!(index.get_all().expect("all").is_empty());
    }

    #[test]
    fn entries_survive_close_and_reopen() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("titles");
        {
            let index = TitleIndex::open(&path).expect("open");
            index.set("Persistent Note", 7).expect("set");
            index.close().expect("close");
        }
        let reopened = TitleIndex::open(&path).expect("reopen");
        assert_eq!(reopened.get("persistent note").expect("get"), Some(7));
        reopened.close().expect("close");
    }
}
