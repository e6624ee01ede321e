//! Task comments.

use crate::model::entity::LifecycleState;
use crate::model::ids::{CommentId, TaskId};
use serde::{Deserialize, Serialize};

/// Comment on exactly one task.
///
/// `body` changes only through an edit, which records the prior text in a
/// `CommentEdited` history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub task_id: TaskId,
    pub author: String,
    pub body: String,
    pub state: LifecycleState,
    pub created_at: i64,
}
