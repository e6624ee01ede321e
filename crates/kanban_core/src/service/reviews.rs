//! Stored weekly reviews.

use super::KanbanService;
use crate::clock::DateRange;
use crate::error::{KanbanError, KanbanResult};
use crate::evidence::bundle::EvidenceQuery;
use crate::extension::plugin::PluginError;
use crate::extension::registry::PluginRegistry;
use crate::model::ids::{new_opaque_id, REVIEW_ID_PREFIX};
use crate::model::review::WeeklyReview;
use std::collections::BTreeSet;

impl KanbanService {
    /// Renders `query` with the active plugin and stores the result.
    ///
    /// # Contract
    /// - A plugin failure is returned as the inner error and stores nothing.
    /// - Empty board or story scopes are filled from the touched tasks:
    ///   boards of the tasks still live, stories of every touched task.
    /// - The review keeps the ids of the history entries and comments it was
    ///   rendered from.
    pub fn record_review(
        &self,
        registry: &PluginRegistry,
        query: &EvidenceQuery,
    ) -> KanbanResult<Result<WeeklyReview, PluginError>> {
        let bundle = self.build_evidence(query)?;
        let document = match registry.summarize_active(&bundle) {
            Ok(document) => document,
            Err(err) => return Ok(Err(err)),
        };
        let plugin_id = registry.active_plugin_id().unwrap_or_default().to_string();
        let review_id = new_opaque_id(REVIEW_ID_PREFIX);
        let subject = review_id.clone();

        self.run("review_record", &subject, move |state, unit| {
            let store = state.store();
            let board_ids = if query.board_ids.is_empty() {
                bundle
                    .touched_task_ids
                    .iter()
                    .filter_map(|task_id| store.task(task_id))
                    .map(|task| task.board_id.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            } else {
                query.board_ids.clone()
            };
            let story_ids = if query.story_ids.is_empty() {
                bundle
                    .touched_task_ids
                    .iter()
                    .filter_map(|task_id| store.story_of_task(task_id))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            } else {
                query.story_ids.clone()
            };

            let review = WeeklyReview {
                id: review_id,
                board_ids,
                story_ids,
                date_range: bundle.date_range,
                plugin_id,
                summary_markdown: document.markdown,
                metadata: document.metadata,
                evidence_entry_ids: bundle
                    .history_entries
                    .iter()
                    .map(|entry| entry.id.clone())
                    .collect(),
                evidence_comment_ids: bundle
                    .comments
                    .iter()
                    .map(|comment| comment.id.clone())
                    .collect(),
                created_at: unit.timestamp(),
            };
            store.check_review(&review)?;
            unit.review(review.clone());
            Ok(Ok(review))
        })
    }

    pub fn review(&self, review_id: &str) -> KanbanResult<WeeklyReview> {
        self.snapshot()
            .store()
            .review(review_id)
            .cloned()
            .ok_or_else(|| KanbanError::UnknownEntity(review_id.to_string()))
    }

    /// Stored reviews whose window overlaps `range`, oldest window first.
    pub fn reviews(&self, range: DateRange) -> Vec<WeeklyReview> {
        self.snapshot()
            .store()
            .reviews_overlapping(&range)
            .into_iter()
            .cloned()
            .collect()
    }
}
