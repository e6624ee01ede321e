//! Domain model for boards, stories, tasks, comments and their history.
//!
//! # Invariants
//! - Entities refer to each other by id only; the integrity store owns all
//!   records and resolves references.
//! - A task's story color is never copied onto the task.

pub mod board;
pub mod comment;
pub mod entity;
pub mod history;
pub mod ids;
pub mod review;
pub mod story;
pub mod task;

/// Normalizes a tag list: trimmed, lowercase, deduplicated, sorted.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Trims a required text field, rejecting blank values.
pub(crate) fn require_text(field: &'static str, value: &str) -> crate::KanbanResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::KanbanError::Validation(format!(
            "{field} must not be blank"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{normalize_tags, require_text};

    #[test]
    fn tags_are_normalized() {
        let tags = vec![
            " Backend ".to_string(),
            "backend".to_string(),
            "".to_string(),
            "API".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["api", "backend"]);
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(require_text("title", "   ").is_err());
        assert_eq!(require_text("title", " x ").unwrap(), "x");
    }
}
