//! Evidence bundle types handed to summary plugins.

use crate::clock::DateRange;
use crate::model::comment::Comment;
use crate::model::history::HistoryEntry;
use crate::model::ids::{BoardId, StoryId, TaskId};
use serde::Serialize;

/// Window and optional scope of an evidence build. Empty id lists do not
/// filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceQuery {
    pub date_range: DateRange,
    pub board_ids: Vec<BoardId>,
    pub story_ids: Vec<StoryId>,
}

impl EvidenceQuery {
    pub fn new(date_range: DateRange) -> Self {
        Self {
            date_range,
            board_ids: Vec::new(),
            story_ids: Vec::new(),
        }
    }

    pub fn with_boards(mut self, board_ids: Vec<BoardId>) -> Self {
        self.board_ids = board_ids;
        self
    }

    pub fn with_stories(mut self, story_ids: Vec<StoryId>) -> Self {
        self.story_ids = story_ids;
        self
    }
}

/// Read-only, date-windowed activity set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceBundle {
    pub date_range: DateRange,
    /// Ordered by `(created_at, id)`.
    pub comments: Vec<Comment>,
    /// Ordered by `(timestamp, seq)`.
    pub history_entries: Vec<HistoryEntry>,
    /// Sorted and deduplicated.
    pub touched_task_ids: Vec<TaskId>,
}

impl EvidenceBundle {
    pub fn empty(date_range: DateRange) -> Self {
        Self {
            date_range,
            comments: Vec::new(),
            history_entries: Vec::new(),
            touched_task_ids: Vec::new(),
        }
    }

    /// True when nothing happened in the window.
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty() && self.history_entries.is_empty()
    }
}
