//! Create/update operations for boards, columns, stories, tasks and comments.
//!
//! Each operation plans exactly one unit: the entity writes plus one history
//! entry per changed entity. Updates that change nothing append nothing.

use super::lifecycle::refuse_if_rehomed;
use super::KanbanService;
use crate::error::{KanbanError, KanbanResult};
use crate::model::board::{Board, BoardPatch, BoardSettings, Column};
use crate::model::comment::Comment;
use crate::model::entity::{Entity, EntityKind, LifecycleState};
use crate::model::history::{
    payload, HistoryEntry, HistoryKind, HistoryPayload, PAYLOAD_BOARD_ID, PAYLOAD_COLUMN_ID,
    PAYLOAD_FROM_COLUMN_ID, PAYLOAD_STORY_ID, PAYLOAD_TASK_ID, PAYLOAD_TO_COLUMN_ID,
    PAYLOAD_TO_COLUMN_NAME,
};
use crate::model::ids::{
    new_opaque_id, ColumnId, CommentId, StoryId, TaskId, BOARD_ID_PREFIX,
    COLUMN_ID_PREFIX, COMMENT_ID_PREFIX, STORY_ID_PREFIX,
};
use crate::model::story::{
    normalize_color, normalize_story_code, NewStory, Story, StoryPatch, DEFAULT_STORY_COLOR,
    DEFAULT_STORY_STATUS,
};
use crate::model::task::{NewTask, Task, TaskPatch};
use crate::model::{normalize_tags, require_text};
use crate::store::allocator::SequenceCounter;
use crate::store::IntegrityStore;
use std::collections::BTreeSet;

impl KanbanService {
    /// Creates a board and its initial columns in one unit.
    ///
    /// # Contract
    /// - `columns = None` uses the default settings' column names.
    /// - Column positions are `0..n` in the given order.
    pub fn create_board(&self, name: &str, columns: Option<Vec<String>>) -> KanbanResult<Board> {
        let name = require_text("board name", name)?;
        let settings = BoardSettings::default();
        let column_names = match columns {
            Some(names) => names,
            None => settings.default_columns.clone(),
        };
        let column_names = column_names
            .iter()
            .map(|column| require_text("column name", column))
            .collect::<KanbanResult<Vec<String>>>()?;

        let board_id = new_opaque_id(BOARD_ID_PREFIX);
        self.run("board_create", &board_id.clone(), move |_, unit| {
            let board = Board {
                id: board_id,
                name,
                settings,
                state: LifecycleState::Active,
                created_at: unit.timestamp(),
            };
            unit.put(Entity::Board(board.clone()));
            unit.record(
                EntityKind::Board,
                board.id.clone(),
                HistoryKind::Created,
                HistoryPayload::new(),
            );
            for (position, column_name) in column_names.into_iter().enumerate() {
                let column = Column {
                    id: new_opaque_id(COLUMN_ID_PREFIX),
                    board_id: board.id.clone(),
                    name: column_name,
                    position: position as i64,
                    state: LifecycleState::Active,
                    created_at: unit.timestamp(),
                };
                unit.record(
                    EntityKind::Column,
                    column.id.clone(),
                    HistoryKind::Created,
                    payload([(PAYLOAD_BOARD_ID, board.id.as_str())]),
                );
                unit.put(Entity::Column(column));
            }
            Ok(board)
        })
    }

    pub fn update_board(&self, board_id: &str, patch: BoardPatch) -> KanbanResult<Board> {
        self.run("board_update", board_id, |state, unit| {
            let current = live_board(state.store(), board_id)?;
            let mut board = current.clone();
            let mut changes = HistoryPayload::new();
            if let Some(name) = patch.name {
                board.name = require_text("board name", &name)?;
                record_change(&mut changes, "name", &current.name, &board.name);
            }
            if let Some(settings) = patch.settings {
                if settings != current.settings {
                    changes.insert("settings_changed".to_string(), "true".to_string());
                }
                board.settings = settings;
            }
            if changes.is_empty() {
                return Ok(board);
            }
            unit.put(Entity::Board(board.clone()));
            unit.record(EntityKind::Board, board_id, HistoryKind::Updated, changes);
            Ok(board)
        })
    }

    /// Adds a column; `position = None` appends after the last column.
    /// Positions are non-negative and never wrap.
    pub fn add_column(
        &self,
        board_id: &str,
        name: &str,
        position: Option<i64>,
    ) -> KanbanResult<Column> {
        let name = require_text("column name", name)?;
        self.run("column_add", board_id, |state, unit| {
            let store = state.store();
            let position = match position {
                Some(position) if position < 0 => {
                    return Err(KanbanError::Validation(format!(
                        "column position {position} is negative"
                    )));
                }
                Some(position) => position,
                None => match store.columns_of_board(board_id).last() {
                    Some(last) => last.position.checked_add(1).ok_or_else(|| {
                        KanbanError::Validation(format!(
                            "board {board_id} has no position left after {}",
                            last.position
                        ))
                    })?,
                    None => 0,
                },
            };
            let column = Column {
                id: new_opaque_id(COLUMN_ID_PREFIX),
                board_id: board_id.to_string(),
                name,
                position,
                state: LifecycleState::Active,
                created_at: unit.timestamp(),
            };
            store.check_column(&column)?;
            unit.put(Entity::Column(column.clone()));
            unit.record(
                EntityKind::Column,
                column.id.clone(),
                HistoryKind::Created,
                payload([(PAYLOAD_BOARD_ID, board_id)]),
            );
            Ok(column)
        })
    }

    pub fn rename_column(&self, column_id: &str, name: &str) -> KanbanResult<Column> {
        let name = require_text("column name", name)?;
        self.run("column_rename", column_id, |state, unit| {
            let current = state
                .store()
                .column(column_id)
                .ok_or_else(|| KanbanError::UnknownEntity(column_id.to_string()))?;
            if current.name == name {
                return Ok(current.clone());
            }
            let mut changes = payload([(PAYLOAD_BOARD_ID, current.board_id.as_str())]);
            record_change(&mut changes, "name", &current.name, &name);
            let column = Column {
                name,
                ..current.clone()
            };
            unit.put(Entity::Column(column.clone()));
            unit.record(EntityKind::Column, column_id, HistoryKind::Updated, changes);
            Ok(column)
        })
    }

    /// Reassigns positions `0..n` following `column_ids`.
    ///
    /// `column_ids` must list every column of the board exactly once. The
    /// change is recorded once, on the board.
    pub fn reorder_columns(
        &self,
        board_id: &str,
        column_ids: &[ColumnId],
    ) -> KanbanResult<Vec<Column>> {
        self.run("column_reorder", board_id, |state, unit| {
            let store = state.store();
            live_board(store, board_id)?;
            let current = store.columns_of_board(board_id);
            let expected: BTreeSet<&str> = current.iter().map(|column| column.id.as_str()).collect();
            let requested: BTreeSet<&str> = column_ids.iter().map(String::as_str).collect();
            if requested.len() != column_ids.len() || requested != expected {
                return Err(KanbanError::Validation(format!(
                    "column order must list each of the {} columns of board {board_id} once",
                    expected.len()
                )));
            }

            let mut reordered = Vec::with_capacity(column_ids.len());
            let mut changed = false;
            for (position, column_id) in column_ids.iter().enumerate() {
                let Some(column) = store.column(column_id) else {
                    return Err(KanbanError::UnknownEntity(column_id.clone()));
                };
                let position = position as i64;
                if column.position != position {
                    changed = true;
                    let moved = Column {
                        position,
                        ..column.clone()
                    };
                    unit.put(Entity::Column(moved.clone()));
                    reordered.push(moved);
                } else {
                    reordered.push(column.clone());
                }
            }
            if changed {
                let old_order: Vec<&str> = current.iter().map(|column| column.id.as_str()).collect();
                let mut changes = HistoryPayload::new();
                record_change(
                    &mut changes,
                    "column_order",
                    &old_order.join(","),
                    &column_ids.join(","),
                );
                unit.record(EntityKind::Board, board_id, HistoryKind::Updated, changes);
            }
            Ok(reordered)
        })
    }

    /// Creates a story and its sequence counter.
    pub fn create_story(&self, new_story: NewStory) -> KanbanResult<Story> {
        let code = normalize_story_code(&new_story.code)?;
        let title = require_text("story title", &new_story.title)?;
        let color = match new_story.color.as_deref() {
            Some(color) => normalize_color(color)?,
            None => DEFAULT_STORY_COLOR.to_string(),
        };
        let status = match new_story.status.as_deref() {
            Some(status) => require_text("story status", status)?,
            None => DEFAULT_STORY_STATUS.to_string(),
        };
        let story_id: StoryId = new_opaque_id(STORY_ID_PREFIX);

        self.run("story_create", &code.clone(), move |state, unit| {
            let story = Story {
                id: story_id,
                code,
                title,
                description: new_story.description.trim().to_string(),
                color,
                status,
                tags: normalize_tags(&new_story.tags),
                state: LifecycleState::Active,
                created_at: unit.timestamp(),
            };
            state.store().check_story(&story)?;
            unit.counter(SequenceCounter::new(story.code.clone(), story.id.clone()));
            unit.put(Entity::Story(story.clone()));
            unit.record(
                EntityKind::Story,
                story.id.clone(),
                HistoryKind::Created,
                payload([("code", story.code.as_str())]),
            );
            Ok(story)
        })
    }

    /// Applies a partial story update, recorded as `StoryChanged`.
    ///
    /// Task records are never touched: their displayed color is derived from
    /// the story at read time. A code change is refused once the story's
    /// counter has issued a task id.
    pub fn update_story(&self, story_id: &str, patch: StoryPatch) -> KanbanResult<Story> {
        self.run("story_update", story_id, |state, unit| {
            let store = state.store();
            let current = store
                .story(story_id)
                .ok_or_else(|| KanbanError::UnknownEntity(story_id.to_string()))?;
            let mut story = current.clone();
            if let Some(code) = patch.code.as_deref() {
                story.code = normalize_story_code(code)?;
            }
            if let Some(title) = patch.title.as_deref() {
                story.title = require_text("story title", title)?;
            }
            if let Some(description) = patch.description.as_deref() {
                story.description = description.trim().to_string();
            }
            if let Some(color) = patch.color.as_deref() {
                story.color = normalize_color(color)?;
            }
            if let Some(status) = patch.status.as_deref() {
                story.status = require_text("story status", status)?;
            }
            if let Some(tags) = patch.tags.as_deref() {
                story.tags = normalize_tags(tags);
            }

            let mut changes = HistoryPayload::new();
            record_change(&mut changes, "code", &current.code, &story.code);
            record_change(&mut changes, "title", &current.title, &story.title);
            record_change(
                &mut changes,
                "description",
                &current.description,
                &story.description,
            );
            record_change(&mut changes, "color", &current.color, &story.color);
            record_change(&mut changes, "status", &current.status, &story.status);
            record_change(
                &mut changes,
                "tags",
                &current.tags.join(","),
                &story.tags.join(","),
            );
            if changes.is_empty() {
                return Ok(story);
            }

            if story.code != current.code {
                let issued = store
                    .allocator()
                    .counter(&current.code)
                    .map_or(true, SequenceCounter::has_issued);
                if issued {
                    return Err(KanbanError::integrity(format!(
                        "story code {} already numbers task ids",
                        current.code
                    )));
                }
                store.check_story(&story)?;
                unit.drop_counter(current.code.clone());
                unit.counter(SequenceCounter::new(story.code.clone(), story.id.clone()));
            }
            unit.put(Entity::Story(story.clone()));
            unit.record(EntityKind::Story, story_id, HistoryKind::StoryChanged, changes);
            Ok(story)
        })
    }

    /// Creates a task under its story, numbered by the story counter.
    ///
    /// # Contract
    /// - The board follows the column.
    /// - Missing or deleted story/column fails with `IntegrityViolation`.
    pub fn create_task(&self, new_task: NewTask) -> KanbanResult<Task> {
        let title = require_text("task title", &new_task.title)?;
        let subject = new_task.story_id.clone();
        self.run("task_create", &subject, move |state, unit| {
            let store = state.store();
            let story = store.story(&new_task.story_id).ok_or_else(|| {
                KanbanError::integrity(format!(
                    "task references missing story {}",
                    new_task.story_id
                ))
            })?;
            let column = store.column(&new_task.column_id).ok_or_else(|| {
                KanbanError::integrity(format!(
                    "task references missing column {}",
                    new_task.column_id
                ))
            })?;
            let (task_id, counter) = store.plan_task_id(&story.code)?;
            let task = Task {
                id: task_id,
                story_id: story.id.clone(),
                board_id: column.board_id.clone(),
                column_id: column.id.clone(),
                title,
                description: new_task.description.trim().to_string(),
                priority: new_task.priority.trim().to_string(),
                estimate: new_task.estimate.trim().to_string(),
                due_date: trimmed_option(new_task.due_date.as_deref()),
                tags: normalize_tags(&new_task.tags),
                state: LifecycleState::Active,
                created_at: unit.timestamp(),
            };
            store.check_task(&task)?;
            unit.counter(counter);
            unit.put(Entity::Task(task.clone()));
            unit.record(
                EntityKind::Task,
                task.id.to_string(),
                HistoryKind::Created,
                placement_payload(&task),
            );
            Ok(task)
        })
    }

    pub fn update_task(&self, task_id: &TaskId, patch: TaskPatch) -> KanbanResult<Task> {
        self.run("task_update", &task_id.to_string(), |state, unit| {
            let current = live_task(state.store(), task_id)?;
            refuse_if_rehomed(state.store(), task_id, "update")?;
            let mut task = current.clone();
            if let Some(title) = patch.title.as_deref() {
                task.title = require_text("task title", title)?;
            }
            if let Some(description) = patch.description.as_deref() {
                task.description = description.trim().to_string();
            }
            if let Some(priority) = patch.priority.as_deref() {
                task.priority = priority.trim().to_string();
            }
            if let Some(estimate) = patch.estimate.as_deref() {
                task.estimate = estimate.trim().to_string();
            }
            if let Some(due_date) = patch.due_date.as_ref() {
                task.due_date = trimmed_option(due_date.as_deref());
            }
            if let Some(tags) = patch.tags.as_deref() {
                task.tags = normalize_tags(tags);
            }

            let mut changes = HistoryPayload::new();
            record_change(&mut changes, "title", &current.title, &task.title);
            record_change(
                &mut changes,
                "description",
                &current.description,
                &task.description,
            );
            record_change(&mut changes, "priority", &current.priority, &task.priority);
            record_change(&mut changes, "estimate", &current.estimate, &task.estimate);
            record_change(
                &mut changes,
                "due_date",
                current.due_date.as_deref().unwrap_or_default(),
                task.due_date.as_deref().unwrap_or_default(),
            );
            record_change(
                &mut changes,
                "tags",
                &current.tags.join(","),
                &task.tags.join(","),
            );
            if changes.is_empty() {
                return Ok(task);
            }
            unit.put(Entity::Task(task.clone()));
            unit.record(EntityKind::Task, task_id.to_string(), HistoryKind::Updated, changes);
            Ok(task)
        })
    }

    /// Moves a task to another column, possibly on another board.
    pub fn move_task(&self, task_id: &TaskId, column_id: &str) -> KanbanResult<Task> {
        self.run("task_move", &task_id.to_string(), |state, unit| {
            let store = state.store();
            let current = live_task(store, task_id)?;
            refuse_if_rehomed(store, task_id, "move")?;
            let column = store.column(column_id).ok_or_else(|| {
                KanbanError::integrity(format!("task {task_id} cannot move to missing column {column_id}"))
            })?;
            if current.column_id == column.id {
                return Ok(current.clone());
            }
            let task = Task {
                column_id: column.id.clone(),
                board_id: column.board_id.clone(),
                ..current.clone()
            };
            store.check_task(&task)?;

            let mut changes = payload([
                (PAYLOAD_FROM_COLUMN_ID, current.column_id.as_str()),
                (PAYLOAD_TO_COLUMN_ID, column.id.as_str()),
                (PAYLOAD_TO_COLUMN_NAME, column.name.as_str()),
                (PAYLOAD_BOARD_ID, column.board_id.as_str()),
            ]);
            if current.board_id != task.board_id {
                changes.insert("from_board_id".to_string(), current.board_id.clone());
            }
            unit.put(Entity::Task(task.clone()));
            unit.record(EntityKind::Task, task_id.to_string(), HistoryKind::Moved, changes);
            Ok(task)
        })
    }

    pub fn add_comment(&self, task_id: &TaskId, author: &str, body: &str) -> KanbanResult<Comment> {
        let author = require_text("comment author", author)?;
        let body = require_text("comment body", body)?;
        let comment_id: CommentId = new_opaque_id(COMMENT_ID_PREFIX);
        self.run("comment_add", &task_id.to_string(), move |state, unit| {
            let comment = Comment {
                id: comment_id,
                task_id: task_id.clone(),
                author,
                body,
                state: LifecycleState::Active,
                created_at: unit.timestamp(),
            };
            state.store().check_comment(&comment)?;
            unit.put(Entity::Comment(comment.clone()));
            unit.record(
                EntityKind::Comment,
                comment.id.clone(),
                HistoryKind::Created,
                payload([(PAYLOAD_TASK_ID, task_id.to_string())]),
            );
            Ok(comment)
        })
    }

    /// Replaces a comment body; the prior text stays in the ledger.
    pub fn edit_comment(&self, comment_id: &str, body: &str) -> KanbanResult<Comment> {
        let body = require_text("comment body", body)?;
        self.run("comment_edit", comment_id, |state, unit| {
            let current = state
                .store()
                .comment(comment_id)
                .ok_or_else(|| KanbanError::UnknownEntity(comment_id.to_string()))?;
            if current.body == body {
                return Ok(current.clone());
            }
            let comment = Comment {
                body,
                ..current.clone()
            };
            unit.put(Entity::Comment(comment.clone()));
            unit.record(
                EntityKind::Comment,
                comment_id,
                HistoryKind::CommentEdited,
                payload([
                    ("previous_body", current.body.as_str()),
                    (PAYLOAD_TASK_ID, current.task_id.to_string().as_str()),
                ]),
            );
            Ok(comment)
        })
    }

    /// Appends a caller-supplied entry to a live entity's ledger segment.
    ///
    /// `Deleted` entries are written by hard delete only.
    pub fn append_history(
        &self,
        entity_id: &str,
        kind: HistoryKind,
        entry_payload: HistoryPayload,
    ) -> KanbanResult<HistoryEntry> {
        if kind == HistoryKind::Deleted {
            return Err(KanbanError::Validation(
                "deleted entries are recorded by hard delete".to_string(),
            ));
        }
        self.run("history_append", entity_id, |state, unit| {
            let entity = state
                .store()
                .live(entity_id)
                .ok_or_else(|| KanbanError::UnknownEntity(entity_id.to_string()))?;
            let entry = unit.record(entity.kind(), entity_id, kind, entry_payload);
            Ok(entry.clone())
        })
    }

    /// Issues the next task id of a story without creating a task.
    ///
    /// The bump is durable; the number is never handed out again.
    pub fn allocate_task_id(&self, story_code: &str) -> KanbanResult<TaskId> {
        let code = normalize_story_code(story_code)?;
        self.run("task_id_allocate", &code.clone(), move |state, unit| {
            let (task_id, counter) = state.store().plan_task_id(&code)?;
            unit.counter(counter);
            Ok(task_id)
        })
    }
}

fn live_board<'a>(store: &'a IntegrityStore, board_id: &str) -> KanbanResult<&'a Board> {
    store
        .board(board_id)
        .ok_or_else(|| KanbanError::UnknownEntity(board_id.to_string()))
}

fn live_task<'a>(store: &'a IntegrityStore, task_id: &TaskId) -> KanbanResult<&'a Task> {
    store
        .task(task_id)
        .ok_or_else(|| KanbanError::UnknownEntity(task_id.to_string()))
}

/// Parent ids carried by `Created` and `Deleted` entries of a task.
pub(super) fn placement_payload(task: &Task) -> HistoryPayload {
    payload([
        (PAYLOAD_STORY_ID, task.story_id.as_str()),
        (PAYLOAD_BOARD_ID, task.board_id.as_str()),
        (PAYLOAD_COLUMN_ID, task.column_id.as_str()),
    ])
}

fn record_change(changes: &mut HistoryPayload, field: &str, old: &str, new: &str) {
    if old != new {
        changes.insert(format!("old_{field}"), old.to_string());
        changes.insert(format!("new_{field}"), new.to_string());
    }
}

fn trimmed_option(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
