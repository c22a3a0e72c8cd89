mod collection;
mod index;
mod ingest;
mod note;
mod search;

pub use collection::{Collection, CollectionId, CollectionUpdate};
pub use index::{TitleIndexDrift, TitleIndexEntry, TitleIndexRebuildReport};
pub use ingest::{ImportFailure, ImportOptions, ImportReport};
pub use note::{Note, NoteId, NoteLink, NoteSummary, ProcessOutcome, ProcessedNote, TagCount};
pub use search::SearchResult;
