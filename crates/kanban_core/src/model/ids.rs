//! Entity identifiers.
//!
//! Boards, columns, stories, comments and history entries use opaque
//! `<prefix>_<uuid>` ids. Task ids encode their story: `<CODE>-<seq>` with
//! `seq` zero-padded to at least three digits.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type BoardId = String;
pub type ColumnId = String;
pub type StoryId = String;
pub type CommentId = String;

pub const BOARD_ID_PREFIX: &str = "board";
pub const COLUMN_ID_PREFIX: &str = "col";
pub const STORY_ID_PREFIX: &str = "story";
pub const COMMENT_ID_PREFIX: &str = "cmt";
pub const HISTORY_ID_PREFIX: &str = "hist";
pub const REVIEW_ID_PREFIX: &str = "review";

static STORY_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]{0,15}$").expect("valid story code regex"));

/// Generates a fresh opaque id such as `board_3f2a...`.
pub fn new_opaque_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Whether `code` is a well-formed story code (`ALPHA`, `X1`, ...).
pub fn is_valid_story_code(code: &str) -> bool {
    STORY_CODE_RE.is_match(code)
}

/// Immutable story-scoped task identifier.
///
/// Ordered by story code, then numerically by sequence, so `A-999 < A-1000`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    story_code: String,
    seq: u64,
}

impl TaskId {
    /// Builds an id from a validated code and a sequence number >= 1.
    pub(crate) fn new(story_code: &str, seq: u64) -> Self {
        Self {
            story_code: story_code.to_string(),
            seq,
        }
    }

    /// Parses the canonical `<CODE>-<seq>` form.
    ///
    /// Rejects non-canonical padding (`A-01`, `A-0001`) so every task has
    /// exactly one textual id.
    pub fn parse(value: &str) -> Option<Self> {
        let (code, digits) = value.rsplit_once('-')?;
        if !is_valid_story_code(code) || digits.len() < 3 {
            return None;
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let seq: u64 = digits.parse().ok()?;
        if seq == 0 {
            return None;
        }
        let id = Self::new(code, seq);
        (id.to_string() == value).then_some(id)
    }

    pub fn story_code(&self) -> &str {
        &self.story_code
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:03}", self.story_code, self.seq)
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TaskId::parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid task id `{raw}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::{is_valid_story_code, new_opaque_id, TaskId};

    #[test]
    fn task_id_pads_to_three_digits() {
        assert_eq!(TaskId::new("ALPHA", 2).to_string(), "ALPHA-002");
        assert_eq!(TaskId::new("ALPHA", 1234).to_string(), "ALPHA-1234");
    }

    #[test]
    fn task_id_parse_accepts_only_canonical_form() {
        let id = TaskId::parse("BETA-017").unwrap();
        assert_eq!(id.story_code(), "BETA");
        assert_eq!(id.seq(), 17);
        assert!(TaskId::parse("BETA-17").is_none());
        assert!(TaskId::parse("BETA-0017").is_none());
        assert!(TaskId::parse("BETA-000").is_none());
        assert!(TaskId::parse("beta-001").is_none());
        assert!(TaskId::parse("BETA").is_none());
        assert_eq!(TaskId::parse("BETA-1000").unwrap().seq(), 1000);
    }

    #[test]
    fn task_ids_order_numerically_within_story() {
        let small = TaskId::new("A", 999);
        let large = TaskId::new("A", 1000);
        assert!(small < large);
    }

    #[test]
    fn task_id_serializes_as_string() {
        let id = TaskId::new("OPS", 5);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"OPS-005\"");
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<TaskId>("\"nope\"").is_err());
    }

    #[test]
    fn story_codes_are_uppercase_alphanumeric() {
        assert!(is_valid_story_code("ALPHA"));
        assert!(is_valid_story_code("X1"));
        assert!(!is_valid_story_code("1X"));
        assert!(!is_valid_story_code("alpha"));
        assert!(!is_valid_story_code("AL-PHA"));
    }

    #[test]
    fn opaque_ids_carry_prefix() {
        let id = new_opaque_id("board");
        assert!(id.starts_with("board_"));
        assert_eq!(id.len(), "board_".len() + 32);
    }
}
