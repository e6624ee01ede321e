//! Built-in markdown summary.
//!
//! Heuristics only: tasks are grouped by the story code in their id, a task
//! counts as completed when it was moved into a column whose name starts with
//! "done", and comments mentioning "block" are listed as risks.

use crate::evidence::bundle::EvidenceBundle;
use crate::extension::manifest::{
    PluginEntrypoints, PluginManifest, CAPABILITY_MARKDOWN_SUMMARY, CAPABILITY_WEEKLY_REVIEW,
};
use crate::extension::plugin::{PluginError, SummaryDocument, SummaryPlugin};
use crate::model::entity::EntityKind;
use crate::model::history::{HistoryKind, PAYLOAD_TO_COLUMN_NAME};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_PLUGIN_ID: &str = "builtin.summary.default";

const EMPTY_SUMMARY: &str = "# Weekly Summary\n\nNo material changes for the selected period.";

pub struct DefaultSummaryPlugin {
    manifest: PluginManifest,
}

impl DefaultSummaryPlugin {
    pub fn new() -> Self {
        Self {
            manifest: PluginManifest {
                id: DEFAULT_PLUGIN_ID.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                display_name: "Default Markdown Summary".to_string(),
                capabilities: vec![
                    CAPABILITY_MARKDOWN_SUMMARY.to_string(),
                    CAPABILITY_WEEKLY_REVIEW.to_string(),
                ],
                entrypoints: PluginEntrypoints {
                    summarize: Some("builtin.summary.render".to_string()),
                    health: Some("builtin.summary.health".to_string()),
                },
            },
        }
    }
}

impl Default for DefaultSummaryPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryPlugin for DefaultSummaryPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn summarize(&self, bundle: &EvidenceBundle) -> Result<SummaryDocument, PluginError> {
        let mut metadata = BTreeMap::new();
        metadata.insert("plugin_id".to_string(), DEFAULT_PLUGIN_ID.to_string());
        metadata.insert(
            "touched_tasks".to_string(),
            bundle.touched_task_ids.len().to_string(),
        );
        let markdown = if bundle.is_empty() {
            EMPTY_SUMMARY.to_string()
        } else {
            render(bundle)
        };
        Ok(SummaryDocument { markdown, metadata })
    }
}

fn render(bundle: &EvidenceBundle) -> String {
    let range = bundle.date_range;
    let mut lines = vec![
        "# Weekly Summary".to_string(),
        String::new(),
        "## Executive Summary".to_string(),
        format!(
            "Reviewed activity between {} and {} (UTC epoch ms).",
            range.start_ms, range.end_ms
        ),
        format!(
            "{} task(s) touched, {} history entries, {} comment(s).",
            bundle.touched_task_ids.len(),
            bundle.history_entries.len(),
            bundle.comments.len()
        ),
    ];

    lines.push(String::new());
    lines.push("## Highlights by Story".to_string());
    let mut by_story: BTreeMap<&str, usize> = BTreeMap::new();
    for task_id in &bundle.touched_task_ids {
        *by_story.entry(task_id.story_code()).or_default() += 1;
    }
    if by_story.is_empty() {
        lines.push("- No task activity.".to_string());
    }
    for (code, count) in &by_story {
        lines.push(format!("- Story {code}: {count} task(s) touched."));
    }

    lines.push(String::new());
    lines.push("## Completed Tasks".to_string());
    let completed: BTreeSet<&str> = bundle
        .history_entries
        .iter()
        .filter(|entry| entry.entity_kind == EntityKind::Task && entry.kind == HistoryKind::Moved)
        .filter(|entry| {
            entry
                .payload
                .get(PAYLOAD_TO_COLUMN_NAME)
                .is_some_and(|name| name.trim().to_lowercase().starts_with("done"))
        })
        .map(|entry| entry.entity_id.as_str())
        .collect();
    if completed.is_empty() {
        lines.push("- None in this period.".to_string());
    }
    for task_id in completed {
        lines.push(format!("- {task_id}"));
    }

    lines.push(String::new());
    lines.push("## Blockers / Risks".to_string());
    let blockers: Vec<_> = bundle
        .comments
        .iter()
        .filter(|comment| comment.body.to_lowercase().contains("block"))
        .collect();
    if blockers.is_empty() {
        lines.push("- No blockers recorded.".to_string());
    }
    for comment in blockers {
        lines.push(format!("- {}: {}", comment.task_id, single_line(&comment.body)));
    }

    lines.push(String::new());
    lines.push("## Next Likely Steps".to_string());
    if bundle.touched_task_ids.is_empty() {
        lines.push("- Await new activity.".to_string());
    } else {
        lines.push("- Continue progressing active tasks toward Done.".to_string());
    }

    lines.push(String::new());
    lines.push("## Evidence Appendix".to_string());
    for entry in &bundle.history_entries {
        lines.push(format!(
            "- {} {} {} {}",
            entry.timestamp,
            entry.kind.as_str(),
            entry.entity_kind.as_str(),
            entry.entity_id
        ));
    }
    for comment in &bundle.comments {
        lines.push(format!(
            "- {} Comment on {}: {}",
            comment.created_at,
            comment.task_id,
            single_line(&comment.body)
        ));
    }
    lines.join("\n")
}

fn single_line(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::{DefaultSummaryPlugin, EMPTY_SUMMARY};
    use crate::clock::DateRange;
    use crate::evidence::bundle::EvidenceBundle;
    use crate::extension::plugin::SummaryPlugin;
    use crate::model::comment::Comment;
    use crate::model::entity::{EntityKind, LifecycleState};
    use crate::model::history::{payload, HistoryEntry, HistoryKind, PAYLOAD_TO_COLUMN_NAME};
    use crate::model::ids::TaskId;

    #[test]
    fn manifest_is_valid() {
        DefaultSummaryPlugin::new().manifest().validate().unwrap();
    }

    #[test]
    fn empty_bundle_renders_fixed_text() {
        let bundle = EvidenceBundle::empty(DateRange::week_starting(0));
        let document = DefaultSummaryPlugin::new().summarize(&bundle).unwrap();
        assert_eq!(document.markdown, EMPTY_SUMMARY);
    }

    #[test]
    fn renders_completed_tasks_and_blockers() {
        let task_id = TaskId::parse("ALPHA-001").unwrap();
        let mut bundle = EvidenceBundle::empty(DateRange::week_starting(0));
        bundle.history_entries.push(HistoryEntry {
            id: "hist_1".to_string(),
            seq: 1,
            entity_kind: EntityKind::Task,
            entity_id: task_id.to_string(),
            timestamp: 10,
            kind: HistoryKind::Moved,
            payload: payload([(PAYLOAD_TO_COLUMN_NAME, "Done")]),
        });
        bundle.comments.push(Comment {
            id: "cmt_1".to_string(),
            task_id: task_id.clone(),
            author: "sam".to_string(),
            body: "Blocked on\nreview".to_string(),
            state: LifecycleState::Active,
            created_at: 20,
        });
        bundle.touched_task_ids.push(task_id);

        let markdown = DefaultSummaryPlugin::new()
            .summarize(&bundle)
            .unwrap()
            .markdown;
        assert!(markdown.contains("- Story ALPHA: 1 task(s) touched."));
        assert!(markdown.contains("## Completed Tasks\n- ALPHA-001"));
        assert!(markdown.contains("- ALPHA-001: Blocked on review"));
        assert!(markdown.contains("## Evidence Appendix"));
    }
}
