//! Stories: the code-bearing owners of tasks.
//!
//! # Invariants
//! - `code` is unique across live stories and stays reserved by the
//!   identity allocator once any task id was issued under it.
//! - `color` is `#RRGGBB`; tasks derive their color from the story at read
//!   time.

use crate::error::{KanbanError, KanbanResult};
use crate::model::entity::LifecycleState;
use crate::model::ids::{is_valid_story_code, StoryId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STORY_COLOR: &str = "#007ACC";
pub const DEFAULT_STORY_STATUS: &str = "Planned";

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid color regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub code: String,
    pub title: String,
    pub description: String,
    pub color: String,
    pub status: String,
    pub tags: Vec<String>,
    pub state: LifecycleState,
    pub created_at: i64,
}

/// Input for story creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewStory {
    pub code: String,
    pub title: String,
    pub description: String,
    pub color: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
}

impl NewStory {
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial story update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryPatch {
    pub code: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Normalizes and validates a story code.
pub fn normalize_story_code(code: &str) -> KanbanResult<String> {
    let normalized = code.trim().to_ascii_uppercase();
    if !is_valid_story_code(&normalized) {
        return Err(KanbanError::Validation(format!(
            "story code `{}` must match [A-Z][A-Z0-9]{{0,15}}",
            code.trim()
        )));
    }
    Ok(normalized)
}

/// Normalizes and validates a `#RRGGBB` color, uppercasing hex digits.
pub fn normalize_color(color: &str) -> KanbanResult<String> {
    let trimmed = color.trim();
    if !HEX_COLOR_RE.is_match(trimmed) {
        return Err(KanbanError::Validation(format!(
            "color `{trimmed}` must be #RRGGBB"
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::{normalize_color, normalize_story_code};

    #[test]
    fn story_code_is_uppercased() {
        assert_eq!(normalize_story_code(" alpha ").unwrap(), "ALPHA");
        assert!(normalize_story_code("a b").is_err());
        assert!(normalize_story_code("").is_err());
    }

    #[test]
    fn color_must_be_hex_triplet() {
        assert_eq!(normalize_color("#00ff7a").unwrap(), "#00FF7A");
        assert!(normalize_color("red").is_err());
        assert!(normalize_color("#12345").is_err());
    }
}
