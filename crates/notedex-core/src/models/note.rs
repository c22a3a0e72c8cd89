use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CollectionId;

pub type NoteId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub body: String,
    pub collection_id: Option<CollectionId>,
    pub frontmatter: serde_json::Map<String, serde_json::Value>,
    pub content_hash: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: NoteId,
    pub title: String,
    pub collection_id: Option<CollectionId>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// A persisted wiki-link edge. `target_id` stays empty until a note with the
/// matching normalized title exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLink {
    pub source_id: NoteId,
    pub target_key: String,
    pub target_id: Option<NoteId>,
    pub display_text: Option<String>,
    pub is_embed: bool,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub note_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedNote {
    pub note_id: NoteId,
    pub title: String,
    pub outcome: ProcessOutcome,
    pub link_count: usize,
    pub tag_count: usize,
    /// Previous title when an update changed the normalized title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_title: Option<String>,
}
