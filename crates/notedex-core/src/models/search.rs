use serde::{Deserialize, Serialize};

use super::{CollectionId, NoteId};

/// One ranked full-text hit. Lower `rank` is more relevant (FTS5 bm25).
/// Hits with equal rank come back in no guaranteed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub note_id: NoteId,
    pub title: String,
    /// Full body, or a highlighted excerpt for snippet searches.
    pub body: String,
    pub collection_id: Option<CollectionId>,
    pub rank: f64,
}
