//! Active → Archived → Deleted transitions and task rehoming.
//!
//! # Invariants
//! - Deleted is terminal; a tombstoned id answers every transition with
//!   `InvalidTransition`.
//! - Hard delete checks existence, then confirmation, then referential
//!   guards, and writes nothing until all three pass.
//! - Ledger segments of deleted entities are kept; other entities' history
//!   keeps the dangling id, which resolves to the tombstone.

use super::entities::placement_payload;
use super::KanbanService;
use crate::error::{KanbanError, KanbanResult};
use crate::model::entity::{Entity, EntityKind, LifecycleState, Tombstone};
use crate::model::history::{
    payload, HistoryKind, HistoryPayload, PAYLOAD_BOARD_ID, PAYLOAD_NEW_TASK_ID, PAYLOAD_ORIGIN,
    PAYLOAD_REVERSED, PAYLOAD_STORY_ID, PAYLOAD_TASK_ID,
};
use crate::model::ids::TaskId;
use crate::model::story::normalize_story_code;
use crate::model::task::{RehomeLink, Task};
use crate::state::UnitBuilder;
use crate::store::IntegrityStore;

impl KanbanService {
    /// Hides an entity from default listings. It stays queryable and
    /// referenceable.
    pub fn archive(&self, id: &str) -> KanbanResult<Entity> {
        self.run("archive", id, |state, unit| {
            transition(
                state.store(),
                unit,
                id,
                "archive",
                LifecycleState::Active,
                LifecycleState::Archived,
            )
        })
    }

    /// Reverses an archive. Recorded as an `Archived` entry marked reversed.
    pub fn unarchive(&self, id: &str) -> KanbanResult<Entity> {
        self.run("unarchive", id, |state, unit| {
            transition(
                state.store(),
                unit,
                id,
                "unarchive",
                LifecycleState::Archived,
                LifecycleState::Active,
            )
        })
    }

    /// Irreversibly replaces an entity with its tombstone.
    ///
    /// # Contract
    /// - Unknown or already deleted id: `UnknownEntity`.
    /// - `confirmed = false`: `ConfirmationRequired`, nothing written.
    /// - Stories, columns and boards still holding tasks are refused with
    ///   `IntegrityViolation`.
    /// - A board takes its columns along; a task takes its comments along.
    pub fn hard_delete(&self, id: &str, confirmed: bool) -> KanbanResult<Tombstone> {
        self.run("hard_delete", id, |state, unit| {
            let store = state.store();
            let entity = store
                .live(id)
                .ok_or_else(|| KanbanError::UnknownEntity(id.to_string()))?;
            if !confirmed {
                return Err(KanbanError::ConfirmationRequired(id.to_string()));
            }

            match &entity {
                Entity::Story(story) => {
                    refuse_if_holding(store.task_ids_of_story(&story.id), "story", id)?;
                    tombstone(unit, EntityKind::Story, id, payload([("code", story.code.as_str())]));
                }
                Entity::Column(column) => {
                    refuse_if_holding(store.task_ids_in_column(&column.id), "column", id)?;
                    tombstone(
                        unit,
                        EntityKind::Column,
                        id,
                        payload([(PAYLOAD_BOARD_ID, column.board_id.as_str())]),
                    );
                }
                Entity::Board(board) => {
                    refuse_if_holding(store.task_ids_on_board(&board.id), "board", id)?;
                    for column in store.columns_of_board(&board.id) {
                        tombstone(
                            unit,
                            EntityKind::Column,
                            &column.id,
                            payload([(PAYLOAD_BOARD_ID, board.id.as_str())]),
                        );
                    }
                    tombstone(unit, EntityKind::Board, id, HistoryPayload::new());
                }
                Entity::Task(task) => {
                    let task_id = task.id.to_string();
                    for comment in store.comments_of_task(&task.id) {
                        tombstone(
                            unit,
                            EntityKind::Comment,
                            &comment.id,
                            payload([(PAYLOAD_TASK_ID, task_id.as_str())]),
                        );
                    }
                    tombstone(unit, EntityKind::Task, &task_id, placement_payload(task));
                }
                Entity::Comment(comment) => {
                    tombstone(
                        unit,
                        EntityKind::Comment,
                        id,
                        payload([(PAYLOAD_TASK_ID, comment.task_id.to_string())]),
                    );
                }
            }

            Ok(Tombstone {
                kind: entity.kind(),
                id: entity.id(),
                deleted_at: unit.timestamp(),
            })
        })
    }

    /// Moves a task to another story under a freshly issued id.
    ///
    /// # Contract
    /// - The task must be Active; the target code must name a live story
    ///   other than the task's own.
    /// - The new task keeps board, column and fields; comments stay on the
    ///   old task.
    /// - The old task is archived, unchanged otherwise, and linked forward.
    ///   It stays frozen: later updates, moves, unarchive and a second rehome
    ///   fail with `InvalidTransition` from `rehomed`.
    pub fn rehome(&self, task_id: &TaskId, target_story_code: &str) -> KanbanResult<Task> {
        let code = normalize_story_code(target_story_code)?;
        self.run("rehome", &task_id.to_string(), move |state, unit| {
            let store = state.store();
            let current = match store.task(task_id) {
                Some(task) => task,
                None if store.tombstone(&task_id.to_string()).is_some() => {
                    return Err(KanbanError::InvalidTransition {
                        id: task_id.to_string(),
                        from: "deleted",
                        action: "rehome",
                    });
                }
                None => return Err(KanbanError::UnknownEntity(task_id.to_string())),
            };
            refuse_if_rehomed(store, task_id, "rehome")?;
            if current.state != LifecycleState::Active {
                return Err(KanbanError::InvalidTransition {
                    id: task_id.to_string(),
                    from: current.state.as_str(),
                    action: "rehome",
                });
            }
            let target = store
                .story_by_code(&code)
                .ok_or_else(|| KanbanError::UnknownStory(code.clone()))?;
            if target.id == current.story_id {
                return Err(KanbanError::Validation(format!(
                    "task {task_id} already belongs to story {code}"
                )));
            }

            let (new_id, counter) = store.plan_task_id(&target.code)?;
            let successor = Task {
                id: new_id.clone(),
                story_id: target.id.clone(),
                state: LifecycleState::Active,
                created_at: unit.timestamp(),
                ..current.clone()
            };
            store.check_task(&successor)?;
            let retired = Task {
                state: LifecycleState::Archived,
                ..current.clone()
            };

            unit.counter(counter);
            unit.put(Entity::Task(successor.clone()));
            unit.put(Entity::Task(retired));
            unit.rehome_link(RehomeLink {
                old_task_id: task_id.clone(),
                new_task_id: new_id.clone(),
                created_at: unit.timestamp(),
            });
            unit.record(
                EntityKind::Task,
                task_id.to_string(),
                HistoryKind::Rehomed,
                payload([
                    (PAYLOAD_NEW_TASK_ID, new_id.to_string()),
                    (PAYLOAD_STORY_ID, target.id.clone()),
                ]),
            );
            let mut created = placement_payload(&successor);
            created.insert(PAYLOAD_ORIGIN.to_string(), task_id.to_string());
            unit.record(
                EntityKind::Task,
                new_id.to_string(),
                HistoryKind::Created,
                created,
            );
            Ok(successor)
        })
    }
}

fn transition(
    store: &IntegrityStore,
    unit: &mut UnitBuilder,
    id: &str,
    action: &'static str,
    from: LifecycleState,
    to: LifecycleState,
) -> KanbanResult<Entity> {
    let Some(mut entity) = store.live(id) else {
        if store.tombstone(id).is_some() {
            return Err(KanbanError::InvalidTransition {
                id: id.to_string(),
                from: "deleted",
                action,
            });
        }
        return Err(KanbanError::UnknownEntity(id.to_string()));
    };
    if let Entity::Task(task) = &entity {
        refuse_if_rehomed(store, &task.id, action)?;
    }
    if entity.state() != from {
        return Err(KanbanError::InvalidTransition {
            id: id.to_string(),
            from: entity.state().as_str(),
            action,
        });
    }

    entity.set_state(to);
    let mut entry_payload = HistoryPayload::new();
    if to == LifecycleState::Active {
        entry_payload.insert(PAYLOAD_REVERSED.to_string(), "true".to_string());
    }
    unit.put(entity.clone());
    unit.record(entity.kind(), id, HistoryKind::Archived, entry_payload);
    Ok(entity)
}

/// A task superseded by rehome keeps its fields and state for good.
pub(super) fn refuse_if_rehomed(
    store: &IntegrityStore,
    task_id: &TaskId,
    action: &'static str,
) -> KanbanResult<()> {
    match store.rehome_link(task_id) {
        Some(_) => Err(KanbanError::InvalidTransition {
            id: task_id.to_string(),
            from: "rehomed",
            action,
        }),
        None => Ok(()),
    }
}

fn refuse_if_holding<'a>(
    mut task_ids: impl Iterator<Item = &'a TaskId>,
    kind: &str,
    id: &str,
) -> KanbanResult<()> {
    match task_ids.next() {
        Some(task_id) => Err(KanbanError::integrity(format!(
            "{kind} {id} still holds task {task_id}"
        ))),
        None => Ok(()),
    }
}

fn tombstone(unit: &mut UnitBuilder, kind: EntityKind, id: &str, entry_payload: HistoryPayload) {
    unit.tombstone(kind, id);
    unit.record(kind, id, HistoryKind::Deleted, entry_payload);
}
