//! Tasks and rehome links.

use crate::model::entity::LifecycleState;
use crate::model::ids::{BoardId, ColumnId, StoryId, TaskId};
use serde::{Deserialize, Serialize};

/// Task owned by one story and placed in one board column.
///
/// `id` is allocated once and never changes; moving a task to another story
/// is a rehome, which mints a new task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub story_id: StoryId,
    pub board_id: BoardId,
    pub column_id: ColumnId,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub estimate: String,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
    pub state: LifecycleState,
    pub created_at: i64,
}

/// Input for task creation. The board is taken from the column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub story_id: StoryId,
    pub column_id: ColumnId,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub estimate: String,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
}

impl NewTask {
    pub fn new(
        story_id: impl Into<StoryId>,
        column_id: impl Into<ColumnId>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            story_id: story_id.into(),
            column_id: column_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial task update. Story, board and column change through rehome and
/// move, never through a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub estimate: Option<String>,
    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

/// Read model joining a task with its story's display attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub task: Task,
    pub story_code: String,
    pub story_title: String,
    pub story_color: String,
}

/// Forward link from a superseded task to the task that replaced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RehomeLink {
    pub old_task_id: TaskId,
    pub new_task_id: TaskId,
    pub created_at: i64,
}
