use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{NoteId, TitleIndexDrift, TitleIndexEntry, TitleIndexRebuildReport};

use super::Notedex;

impl Notedex {
    /// Title to note id. The index answers first; a miss or index fault falls
    /// back to the notes table and backfills the index entry.
    pub fn resolve_link(&self, title: &str) -> Result<Option<NoteId>> {
        match self.titles.get(title) {
            Ok(Some(id)) => return Ok(Some(id)),
            Ok(None) => {}
            Err(err) => warn!(title, error = %err, "title index lookup failed; using notes table"),
        }
        let found = self.state.find_note_id_by_title(title)?;
        if let Some(id) = found {
            debug!(title, note_id = id, "title index backfilled");
            if let Err(err) = self.titles.set(title, id) {
                warn!(title, error = %err, "title index backfill failed");
            }
        }
        Ok(found)
    }

    /// Clears the index and reloads it from a full scan of the notes table.
    pub fn rebuild_title_index(&self) -> Result<TitleIndexRebuildReport> {
        let entries = self.state.title_index_entries()?;
        let notes_scanned = usize::try_from(self.state.count_notes()?).unwrap_or(usize::MAX);
        self.titles.clear()?;
        let written = self
            .titles
            .batch_set(entries.iter().map(|entry| (entry.key.as_str(), entry.note_id)))?;
        self.titles.flush()?;
        info!(entries = written, notes_scanned, "title index rebuilt");
        Ok(TitleIndexRebuildReport {
            entries: written,
            notes_scanned,
        })
    }

    /// Compares the index against the notes table without changing either.
    pub fn check_title_index(&self) -> Result<TitleIndexDrift> {
        let expected = self
            .state
            .title_index_entries()?
            .into_iter()
            .map(|entry| (entry.key, entry.note_id))
            .collect::<BTreeMap<_, _>>();
        let mut indexed = self.titles.get_all()?;

        let mut drift = TitleIndexDrift::default();
        for (key, note_id) in expected {
            match indexed.remove(&key) {
                None => drift.missing.push(TitleIndexEntry { key, note_id }),
                Some(found) if found != note_id => {
                    drift.stale.push(TitleIndexEntry {
                        key,
                        note_id: found,
                    });
                }
                Some(_) => {}
            }
        }
        drift.orphaned = indexed.into_keys().collect();
        if !drift.is_clean() {
            warn!(drift = drift.drift_count(), "title index drift detected");
        }
        Ok(drift)
    }
}
