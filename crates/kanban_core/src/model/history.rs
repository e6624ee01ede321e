//! History entries recorded by every mutating operation.

use crate::model::entity::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Old/new values relevant to one entry. Ordered for stable serialization.
pub type HistoryPayload = BTreeMap<String, String>;

/// Payload key set on `Archived` entries produced by unarchive.
pub const PAYLOAD_REVERSED: &str = "reversed";
/// Payload key naming the predecessor of a rehomed task.
pub const PAYLOAD_ORIGIN: &str = "origin";
/// Payload key naming the successor of a rehomed task.
pub const PAYLOAD_NEW_TASK_ID: &str = "new_task_id";
/// Parent-id keys; `Created` and `Deleted` entries carry them so a deleted
/// entity can still be placed on its board and story.
pub const PAYLOAD_BOARD_ID: &str = "board_id";
pub const PAYLOAD_COLUMN_ID: &str = "column_id";
pub const PAYLOAD_STORY_ID: &str = "story_id";
pub const PAYLOAD_TASK_ID: &str = "task_id";
/// `Moved` keys.
pub const PAYLOAD_FROM_COLUMN_ID: &str = "from_column_id";
pub const PAYLOAD_TO_COLUMN_ID: &str = "to_column_id";
pub const PAYLOAD_TO_COLUMN_NAME: &str = "to_column_name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Created,
    Moved,
    StoryChanged,
    Updated,
    Archived,
    Deleted,
    CommentEdited,
    Rehomed,
}

impl HistoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Moved => "moved",
            Self::StoryChanged => "story_changed",
            Self::Updated => "updated",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
            Self::CommentEdited => "comment_edited",
            Self::Rehomed => "rehomed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "moved" => Some(Self::Moved),
            "story_changed" => Some(Self::StoryChanged),
            "updated" => Some(Self::Updated),
            "archived" => Some(Self::Archived),
            "deleted" => Some(Self::Deleted),
            "comment_edited" => Some(Self::CommentEdited),
            "rehomed" => Some(Self::Rehomed),
            _ => None,
        }
    }
}

/// One append-only ledger record about one entity.
///
/// `seq` is the local insertion order; it is not exported because another
/// store assigns its own order on import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(skip)]
    pub seq: u64,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub timestamp: i64,
    pub kind: HistoryKind,
    pub payload: HistoryPayload,
}

impl HistoryEntry {
    /// Whether this is an unarchive record (an `Archived` entry marked reversed).
    pub fn is_unarchive(&self) -> bool {
        self.kind == HistoryKind::Archived
            && self.payload.get(PAYLOAD_REVERSED).map(String::as_str) == Some("true")
    }
}

/// Builds a payload from key/value pairs.
pub fn payload<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> HistoryPayload
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
