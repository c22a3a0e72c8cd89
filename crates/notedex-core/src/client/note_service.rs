use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::ingest;
use crate::models::{CollectionId, ImportOptions, ImportReport, NoteId, NoteSummary, ProcessedNote};
use crate::state::NoteWrite;

use super::Notedex;

impl Notedex {
    /// Parse, persist (note, metadata, tags, links), then register the title.
    /// Always creates a new note; use [`Notedex::process_source_note`] to update
    /// one in place.
    pub fn process_note(
        &self,
        collection_id: Option<CollectionId>,
        raw: &[u8],
    ) -> Result<ProcessedNote> {
        self.persist(ingest::prepare_note(raw, collection_id)?)
    }

    /// Like [`Notedex::process_note`], but re-ingesting the same `source_key`
    /// updates that note (or leaves it alone when nothing changed).
    pub fn process_source_note(
        &self,
        collection_id: Option<CollectionId>,
        source_key: &str,
        raw: &[u8],
    ) -> Result<ProcessedNote> {
        self.persist(ingest::prepare_source_note(raw, source_key, collection_id)?)
    }

    /// Notes are keyed on their path relative to `root`.
    pub fn import_directory(&self, root: &Path, options: &ImportOptions) -> Result<ImportReport> {
        let report = ingest::import_directory(root, options, |raw, relative, collection_id| {
            self.process_source_note(collection_id, relative, raw)
        })?;
        self.titles.flush()?;
        Ok(report)
    }

    /// Deletes the note relationally first, then hands its title to the next
    /// holder or drops the entry.
    pub fn delete_note(&self, id: NoteId) -> Result<NoteSummary> {
        let deleted = self.state.delete_note(id)?;
        self.repoint_title(&deleted.title);
        Ok(deleted)
    }

    fn persist(&self, mut write: NoteWrite) -> Result<ProcessedNote> {
        for link in &mut write.links {
            link.target_hint = match self.titles.get(&link.target_title) {
                Ok(hint) => hint,
                Err(err) => {
                    warn!(link_target = %link.target_title, error = %err, "title index lookup failed");
                    None
                }
            };
        }

        let processed = self.state.write_note(&write)?;
        self.repoint_title(&processed.title);
        if let Some(previous) = &processed.replaced_title {
            self.repoint_title(previous);
        }
        Ok(processed)
    }

    /// Points `title` at its oldest holder in the notes table, or removes it when
    /// none is left. Runs after the relational commit, so failures are logged.
    fn repoint_title(&self, title: &str) {
        let outcome = self
            .state
            .find_note_id_by_title(title)
            .and_then(|holder| match holder {
                Some(id) => self.titles.set(title, id),
                None => self.titles.delete(title),
            });
        if let Err(err) = outcome {
            warn!(title, error = %err, "title index update failed; rebuild to recover");
        }
    }
}
