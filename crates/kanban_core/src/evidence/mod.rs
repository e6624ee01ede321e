//! Evidence bundle builder.
//!
//! # Responsibility
//! - Select comments and history entries inside a date window.
//! - Scope them to boards and stories by resolving task → story → board
//!   through the integrity store.
//!
//! # Invariants
//! - Pure read over one snapshot.
//! - An empty window yields an empty bundle, never an error.
//! - Entities that no longer exist are scoped through the parent ids their
//!   history payloads carry; unscopable entries are dropped only when a
//!   filter is set.

pub mod bundle;

use crate::error::KanbanResult;
use crate::ledger::HistoryFilter;
use crate::model::entity::EntityKind;
use crate::model::history::{HistoryEntry, PAYLOAD_BOARD_ID, PAYLOAD_TASK_ID};
use crate::model::ids::{BoardId, StoryId, TaskId};
use crate::state::State;
use crate::store::IntegrityStore;
use crate::worker::BatchGuard;
use bundle::{EvidenceBundle, EvidenceQuery};
use std::collections::BTreeSet;

#[derive(Debug, Default)]
struct Scope {
    board_id: Option<BoardId>,
    story_id: Option<StoryId>,
    task_id: Option<TaskId>,
}

/// Builds the evidence bundle for `query` over one snapshot.
pub(crate) fn build_bundle(
    state: &State,
    query: &EvidenceQuery,
    batches: &mut BatchGuard<'_>,
) -> KanbanResult<EvidenceBundle> {
    let store = state.store();
    let range = query.date_range;
    let mut bundle = EvidenceBundle::empty(range);
    let mut touched: BTreeSet<TaskId> = BTreeSet::new();

    let all = HistoryFilter::default();
    for entry in state.ledger().query_range(range, &all) {
        batches.tick()?;
        let scope = scope_of_entry(store, entry);
        if !in_scope(query, &scope) {
            continue;
        }
        if let Some(task_id) = scope.task_id {
            touched.insert(task_id);
        }
        bundle.history_entries.push(entry.clone());
    }

    let mut comments = Vec::new();
    for comment in store.comments() {
        batches.tick()?;
        if !range.contains(comment.created_at) {
            continue;
        }
        let scope = scope_of_task(store, &comment.task_id);
        if in_scope(query, &scope) {
            touched.insert(comment.task_id.clone());
            comments.push(comment.clone());
        }
    }
    comments.sort_by(|left, right| {
        left.created_at
            .cmp(&right.created_at)
            .then_with(|| left.id.cmp(&right.id))
    });
    bundle.comments = comments;
    bundle.touched_task_ids = touched.into_iter().collect();
    batches.check()?;
    Ok(bundle)
}

fn in_scope(query: &EvidenceQuery, scope: &Scope) -> bool {
    let board_ok = query.board_ids.is_empty()
        || scope
            .board_id
            .as_ref()
            .is_some_and(|board_id| query.board_ids.contains(board_id));
    let story_ok = query.story_ids.is_empty()
        || scope
            .story_id
            .as_ref()
            .is_some_and(|story_id| query.story_ids.contains(story_id));
    board_ok && story_ok
}

fn scope_of_entry(store: &IntegrityStore, entry: &HistoryEntry) -> Scope {
    let payload_str = |key: &str| entry.payload.get(key).cloned();
    match entry.entity_kind {
        EntityKind::Board => Scope {
            board_id: Some(entry.entity_id.clone()),
            ..Scope::default()
        },
        EntityKind::Story => Scope {
            story_id: Some(entry.entity_id.clone()),
            ..Scope::default()
        },
        EntityKind::Column => Scope {
            board_id: store
                .column(&entry.entity_id)
                .map(|column| column.board_id.clone())
                .or_else(|| payload_str(PAYLOAD_BOARD_ID)),
            ..Scope::default()
        },
        EntityKind::Task => match TaskId::parse(&entry.entity_id) {
            Some(task_id) => {
                let mut scope = scope_of_task(store, &task_id);
                if scope.board_id.is_none() {
                    scope.board_id = payload_str(PAYLOAD_BOARD_ID);
                }
                scope
            }
            None => Scope::default(),
        },
        EntityKind::Comment => {
            let task_id = store
                .comment(&entry.entity_id)
                .map(|comment| comment.task_id.clone())
                .or_else(|| payload_str(PAYLOAD_TASK_ID).and_then(|raw| TaskId::parse(&raw)));
            match task_id {
                Some(task_id) => scope_of_task(store, &task_id),
                None => Scope::default(),
            }
        }
    }
}

fn scope_of_task(store: &IntegrityStore, task_id: &TaskId) -> Scope {
    Scope {
        board_id: store.task(task_id).map(|task| task.board_id.clone()),
        story_id: store.story_of_task(task_id),
        task_id: Some(task_id.clone()),
    }
}
