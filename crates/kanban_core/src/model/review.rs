//! Stored weekly reviews.

use crate::clock::DateRange;
use crate::model::ids::{BoardId, CommentId, StoryId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary rendered by a plugin for one window, kept for later reading.
///
/// A review is written once and never edited. The evidence lists name the
/// history entries and comments it was rendered from, so the bundle can be
/// traced after the summary text has been read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyReview {
    pub id: String,
    pub board_ids: Vec<BoardId>,
    pub story_ids: Vec<StoryId>,
    pub date_range: DateRange,
    pub plugin_id: String,
    pub summary_markdown: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub evidence_entry_ids: Vec<String>,
    #[serde(default)]
    pub evidence_comment_ids: Vec<CommentId>,
    pub created_at: i64,
}

impl WeeklyReview {
    /// Whether the review window shares any instant with `range`.
    pub fn overlaps(&self, range: &DateRange) -> bool {
        self.date_range.start_ms < range.end_ms && range.start_ms < self.date_range.end_ms
    }
}
