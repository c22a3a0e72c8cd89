use serde::{Deserialize, Serialize};

use super::NoteId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleIndexEntry {
    pub key: String,
    pub note_id: NoteId,
}

/// Difference between the title index and the relational notes table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleIndexDrift {
    /// Titles present in the store but absent from the index.
    pub missing: Vec<TitleIndexEntry>,
    /// Index entries pointing at a different note than the store says.
    pub stale: Vec<TitleIndexEntry>,
    /// Index keys with no note behind them.
    pub orphaned: Vec<String>,
}

impl TitleIndexDrift {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty() && self.orphaned.is_empty()
    }

    #[must_use]
    pub fn drift_count(&self) -> usize {
        self.missing.len() + self.stale.len() + self.orphaned.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleIndexRebuildReport {
    pub entries: usize,
    pub notes_scanned: usize,
}
