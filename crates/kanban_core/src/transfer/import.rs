//! Conflict-aware import planning.
//!
//! # Responsibility
//! - Classify every incoming record as new, identical or conflicting.
//! - Plan the merged unit: new records, chosen resolutions, counter bumps,
//!   rehome links and the history union.
//!
//! # Invariants
//! - Planning never writes; the caller commits the unit only after the
//!   merged state passes `validate_all`.
//! - Local history is never removed. Incoming entries unknown locally are
//!   appended in document order, except for records whose local version
//!   wins a field conflict; their incoming timeline is skipped.
//! - A local tombstone is terminal: no incoming live record resurrects it.
//! - Weekly reviews are immutable: a review id already stored locally must
//!   carry identical content, whatever the resolution.

use crate::error::{KanbanError, KanbanResult};
use crate::model::entity::{Entity, EntityKind, Tombstone};
use crate::state::{State, UnitBuilder};
use crate::transfer::document::ExportDocument;
use crate::worker::BatchGuard;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

/// How conflicting records are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictResolution {
    /// Any conflict rejects the whole import.
    #[default]
    Reject,
    /// Incoming records replace local ones.
    PreferIncoming,
    /// Local records are kept.
    PreferLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportOptions {
    pub resolution: ConflictResolution,
}

impl ImportOptions {
    pub fn with_resolution(resolution: ConflictResolution) -> Self {
        Self { resolution }
    }
}

/// One record present on both sides with diverging content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictReport {
    pub kind: EntityKind,
    pub id: String,
    pub local: Value,
    pub incoming: Value,
    /// Top-level field names that differ; `history` when timelines differ in
    /// length, `deleted` when one side is a tombstone.
    pub diverging_fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub identical: usize,
    pub conflicts: Vec<ConflictReport>,
    /// Conflicting local records replaced under `PreferIncoming`.
    pub overwritten: usize,
    pub history_appended: usize,
    /// Incoming entries left out because their record kept its local version.
    pub history_skipped: usize,
}

impl ImportReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Plans the merge of `document` into `state`.
///
/// Conflicts are reported, never raised; the caller turns them into
/// `ImportConflict` when the resolution is `Reject`.
pub(crate) fn plan_import(
    state: &State,
    document: &ExportDocument,
    resolution: ConflictResolution,
    unit: &mut UnitBuilder,
    batches: &mut BatchGuard<'_>,
) -> KanbanResult<ImportReport> {
    let mut report = ImportReport::default();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut kept_local: HashSet<String> = HashSet::new();
    let incoming_history = incoming_history_lengths(document);

    let incoming = document
        .boards
        .iter()
        .cloned()
        .map(Entity::Board)
        .chain(document.columns.iter().cloned().map(Entity::Column))
        .chain(document.stories.iter().cloned().map(Entity::Story))
        .chain(document.tasks.iter().cloned().map(Entity::Task))
        .chain(document.comments.iter().cloned().map(Entity::Comment));

    for entity in incoming {
        batches.tick()?;
        let id = entity.id();
        if !seen_ids.insert(id.clone()) {
            return Err(KanbanError::InvalidDocument(format!("duplicate id {id}")));
        }
        let incoming_len = incoming_history.get(id.as_str()).copied().unwrap_or(0);
        if plan_entity(state, entity, incoming_len, resolution, unit, &mut report)? {
            kept_local.insert(id);
        }
    }

    for tombstone in &document.tombstones {
        batches.tick()?;
        if !seen_ids.insert(tombstone.id.clone()) {
            return Err(KanbanError::InvalidDocument(format!(
                "duplicate id {}",
                tombstone.id
            )));
        }
        if plan_tombstone(state, tombstone, resolution, unit, &mut report) {
            kept_local.insert(tombstone.id.clone());
        }
    }

    let allocator = state.store().allocator();
    for counter in &document.sequences {
        batches.tick()?;
        if counter.next_seq == 0 {
            return Err(KanbanError::InvalidDocument(format!(
                "counter {} has next_seq 0",
                counter.story_code
            )));
        }
        match allocator.counter(&counter.story_code) {
            Some(local) if local.story_id != counter.story_id => {
                return Err(KanbanError::integrity(format!(
                    "story code {} is owned by another story",
                    counter.story_code
                )));
            }
            Some(local) if local.next_seq >= counter.next_seq => {}
            _ => unit.counter(counter.clone()),
        }
    }

    for link in &document.rehome_links {
        batches.tick()?;
        match state.store().rehome_link(&link.old_task_id) {
            Some(local) if local.new_task_id == link.new_task_id => {}
            Some(local) => {
                return Err(KanbanError::integrity(format!(
                    "task {} was rehomed to {} locally and {} in the document",
                    link.old_task_id, local.new_task_id, link.new_task_id
                )));
            }
            None => unit.rehome_link(link.clone()),
        }
    }

    for review in &document.weekly_reviews {
        batches.tick()?;
        if !seen_ids.insert(review.id.clone()) {
            return Err(KanbanError::InvalidDocument(format!(
                "duplicate id {}",
                review.id
            )));
        }
        match state.store().review(&review.id) {
            Some(local) if local == review => report.identical += 1,
            Some(_) => {
                return Err(KanbanError::integrity(format!(
                    "weekly review {} differs from the stored copy",
                    review.id
                )));
            }
            None => {
                unit.review(review.clone());
                report.created += 1;
            }
        }
    }

    let ledger = state.ledger();
    let mut seen_entries: HashSet<&str> = HashSet::new();
    for entry in &document.history {
        batches.tick()?;
        if ledger.contains_id(&entry.id) || !seen_entries.insert(entry.id.as_str()) {
            continue;
        }
        if kept_local.contains(&entry.entity_id) {
            report.history_skipped += 1;
            continue;
        }
        unit.record_imported(entry.clone());
        report.history_appended += 1;
    }

    batches.check()?;
    Ok(report)
}

/// Returns `true` when the local record wins a field or deletion conflict.
fn plan_entity(
    state: &State,
    entity: Entity,
    incoming_len: usize,
    resolution: ConflictResolution,
    unit: &mut UnitBuilder,
    report: &mut ImportReport,
) -> KanbanResult<bool> {
    let store = state.store();
    let id = entity.id();

    if let Some(tombstone) = store.tombstone(&id) {
        report.conflicts.push(ConflictReport {
            kind: entity.kind(),
            id,
            local: tombstone_json(tombstone),
            incoming: entity.to_json(),
            diverging_fields: vec!["deleted".to_string()],
        });
        return Ok(true);
    }

    let Some(local) = store.live(&id) else {
        unit.put(entity);
        report.created += 1;
        return Ok(false);
    };

    if local.kind() != entity.kind() {
        return Err(KanbanError::integrity(format!(
            "id {id} is a {} locally but a {} in the document",
            local.kind().as_str(),
            entity.kind().as_str()
        )));
    }

    let local_json = local.to_json();
    let incoming_json = entity.to_json();
    let mut diverging = diverging_fields(&local_json, &incoming_json);
    if state.ledger().history_len(&id) != incoming_len {
        diverging.push("history".to_string());
    }
    if diverging.is_empty() {
        report.identical += 1;
        return Ok(false);
    }

    let fields_differ = local != entity;
    report.conflicts.push(ConflictReport {
        kind: entity.kind(),
        id,
        local: local_json,
        incoming: incoming_json,
        diverging_fields: diverging,
    });
    if !fields_differ {
        return Ok(false);
    }
    if resolution == ConflictResolution::PreferIncoming {
        unit.put(entity);
        report.overwritten += 1;
        return Ok(false);
    }
    Ok(true)
}

fn plan_tombstone(
    state: &State,
    tombstone: &Tombstone,
    resolution: ConflictResolution,
    unit: &mut UnitBuilder,
    report: &mut ImportReport,
) -> bool {
    let store = state.store();
    if store.tombstone(&tombstone.id).is_some() {
        report.identical += 1;
        return false;
    }
    match store.live(&tombstone.id) {
        None => {
            unit.put_tombstone(tombstone.clone());
            report.created += 1;
            false
        }
        Some(local) => {
            report.conflicts.push(ConflictReport {
                kind: tombstone.kind,
                id: tombstone.id.clone(),
                local: local.to_json(),
                incoming: tombstone_json(tombstone),
                diverging_fields: vec!["deleted".to_string()],
            });
            if resolution == ConflictResolution::PreferIncoming {
                unit.put_tombstone(tombstone.clone());
                report.overwritten += 1;
                return false;
            }
            true
        }
    }
}

fn incoming_history_lengths(document: &ExportDocument) -> HashMap<&str, usize> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut lengths: HashMap<&str, usize> = HashMap::new();
    for entry in &document.history {
        if seen.insert(entry.id.as_str()) {
            *lengths.entry(entry.entity_id.as_str()).or_default() += 1;
        }
    }
    lengths
}

fn tombstone_json(tombstone: &Tombstone) -> Value {
    serde_json::to_value(tombstone).unwrap_or(Value::Null)
}

fn diverging_fields(local: &Value, incoming: &Value) -> Vec<String> {
    match (local, incoming) {
        (Value::Object(left), Value::Object(right)) => {
            let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
            keys.into_iter()
                .filter(|key| left.get(key.as_str()) != right.get(key.as_str()))
                .cloned()
                .collect()
        }
        _ if local == incoming => Vec::new(),
        _ => vec!["value".to_string()],
    }
}
