//! Snapshot-to-document serialization.

use crate::error::KanbanResult;
use crate::state::State;
use crate::transfer::document::{DocumentHeader, ExportDocument, SUPPORTED_SCHEMA_VERSION};
use crate::worker::BatchGuard;

/// Serializes a snapshot. Pure apart from `exported_at`.
pub(crate) fn build_document(
    state: &State,
    exported_at: i64,
    batches: &mut BatchGuard<'_>,
) -> KanbanResult<ExportDocument> {
    let store = state.store();

    let mut boards = collect(store.boards(), batches)?;
    boards.sort_by(|left, right| left.id.cmp(&right.id));
    let mut columns = collect(store.columns(), batches)?;
    columns.sort_by(|left, right| left.id.cmp(&right.id));
    let mut stories = collect(store.stories(), batches)?;
    stories.sort_by(|left, right| left.id.cmp(&right.id));
    let mut tasks = collect(store.tasks(), batches)?;
    tasks.sort_by(|left, right| left.id.cmp(&right.id));
    let mut comments = collect(store.comments(), batches)?;
    comments.sort_by(|left, right| left.id.cmp(&right.id));
    let mut tombstones = collect(store.tombstones(), batches)?;
    tombstones.sort_by(|left, right| left.id.cmp(&right.id));
    let mut rehome_links = collect(store.rehome_links(), batches)?;
    rehome_links.sort_by(|left, right| left.old_task_id.cmp(&right.old_task_id));
    let sequences = collect(store.allocator().counters(), batches)?;
    let history = collect(state.ledger().entries(), batches)?;
    let mut weekly_reviews = collect(store.reviews(), batches)?;
    weekly_reviews.sort_by(|left, right| left.id.cmp(&right.id));
    batches.check()?;

    Ok(ExportDocument {
        header: DocumentHeader {
            schema_version: SUPPORTED_SCHEMA_VERSION.to_string(),
            exported_at,
        },
        boards,
        columns,
        stories,
        tasks,
        comments,
        tombstones,
        rehome_links,
        sequences,
        history,
        weekly_reviews,
    })
}

fn collect<'a, T: Clone + 'a>(
    items: impl Iterator<Item = &'a T>,
    batches: &mut BatchGuard<'_>,
) -> KanbanResult<Vec<T>> {
    let mut collected = Vec::new();
    for item in items {
        batches.tick()?;
        collected.push(item.clone());
    }
    Ok(collected)
}
