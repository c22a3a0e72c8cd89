use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CollectionId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub parent_id: Option<CollectionId>,
    /// Slash-joined chain of sanitized ancestor names ending with this node.
    pub path: String,
    pub description: Option<String>,
    pub position: i64,
    pub is_system: bool,
    /// Distance from the subtree root; only set by subtree queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Full replacement of the mutable collection attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionUpdate {
    pub name: String,
    pub parent_id: Option<CollectionId>,
    pub description: Option<String>,
    pub position: i64,
}

impl CollectionUpdate {
    /// Starts from the current state of `collection`, so callers only touch what changes.
    #[must_use]
    pub fn from_current(collection: &Collection) -> Self {
        Self {
            name: collection.name.clone(),
            parent_id: collection.parent_id,
            description: collection.description.clone(),
            position: collection.position,
        }
    }
}
