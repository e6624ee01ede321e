//! Boards and their ordered columns.

use crate::model::entity::LifecycleState;
use crate::model::ids::{BoardId, ColumnId};
use serde::{Deserialize, Serialize};

/// Column names used when a board is created without explicit columns.
pub const DEFAULT_COLUMNS: &[&str] = &["Backlog", "In Progress", "Done"];

/// Free-form board settings blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub default_columns: Vec<String>,
    pub wip_help_text: String,
    pub show_color_legend: bool,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            default_columns: DEFAULT_COLUMNS.iter().map(|name| name.to_string()).collect(),
            wip_help_text: String::new(),
            show_color_legend: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    pub settings: BoardSettings,
    pub state: LifecycleState,
    pub created_at: i64,
}

/// Column of exactly one board. `position` is unique within the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub board_id: BoardId,
    pub name: String,
    pub position: i64,
    pub state: LifecycleState,
    pub created_at: i64,
}

/// Partial board update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardPatch {
    pub name: Option<String>,
    pub settings: Option<BoardSettings>,
}
