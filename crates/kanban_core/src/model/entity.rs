//! Entity kinds, lifecycle state and tombstones.

use crate::model::board::{Board, Column};
use crate::model::comment::Comment;
use crate::model::story::Story;
use crate::model::task::Task;
use serde::{Deserialize, Serialize};

/// Kind of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Board,
    Column,
    Story,
    Task,
    Comment,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::Column => "column",
            Self::Story => "story",
            Self::Task => "task",
            Self::Comment => "comment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "board" => Some(Self::Board),
            "column" => Some(Self::Column),
            "story" => Some(Self::Story),
            "task" => Some(Self::Task),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }
}

/// Lifecycle state of a live entity. Deleted entities only survive as
/// [`Tombstone`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Active,
    Archived,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Minimal record left behind by a hard delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub kind: EntityKind,
    pub id: String,
    pub deleted_at: i64,
}

/// Any live entity held by the integrity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Board(Board),
    Column(Column),
    Story(Story),
    Task(Task),
    Comment(Comment),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Board(_) => EntityKind::Board,
            Self::Column(_) => EntityKind::Column,
            Self::Story(_) => EntityKind::Story,
            Self::Task(_) => EntityKind::Task,
            Self::Comment(_) => EntityKind::Comment,
        }
    }

    pub fn id(&self) -> String {
        match self {
            Self::Board(board) => board.id.clone(),
            Self::Column(column) => column.id.clone(),
            Self::Story(story) => story.id.clone(),
            Self::Task(task) => task.id.to_string(),
            Self::Comment(comment) => comment.id.clone(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self {
            Self::Board(board) => board.state,
            Self::Column(column) => column.state,
            Self::Story(story) => story.state,
            Self::Task(task) => task.state,
            Self::Comment(comment) => comment.state,
        }
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) {
        match self {
            Self::Board(board) => board.state = state,
            Self::Column(column) => column.state = state,
            Self::Story(story) => story.state = state,
            Self::Task(task) => task.state = state,
            Self::Comment(comment) => comment.state = state,
        }
    }

    pub fn created_at(&self) -> i64 {
        match self {
            Self::Board(board) => board.created_at,
            Self::Column(column) => column.created_at,
            Self::Story(story) => story.created_at,
            Self::Task(task) => task.created_at,
            Self::Comment(comment) => comment.created_at,
        }
    }

    /// Field-level JSON view, used for conflict reports.
    pub fn to_json(&self) -> serde_json::Value {
        let value = match self {
            Self::Board(board) => serde_json::to_value(board),
            Self::Column(column) => serde_json::to_value(column),
            Self::Story(story) => serde_json::to_value(story),
            Self::Task(task) => serde_json::to_value(task),
            Self::Comment(comment) => serde_json::to_value(comment),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

/// Lookup result: live entity or the tombstone of a deleted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Live(Entity),
    Tombstone(Tombstone),
}

impl Resolved {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Live(entity) => entity.kind(),
            Self::Tombstone(tombstone) => tombstone.kind,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Tombstone(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityKind, LifecycleState};

    #[test]
    fn kind_round_trips_through_text() {
        for kind in [
            EntityKind::Board,
            EntityKind::Column,
            EntityKind::Story,
            EntityKind::Task,
            EntityKind::Comment,
        ] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("epic"), None);
    }

    #[test]
    fn lifecycle_defaults_to_active() {
        assert_eq!(LifecycleState::default(), LifecycleState::Active);
        assert_eq!(LifecycleState::parse("deleted"), None);
    }
}
