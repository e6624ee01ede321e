//! In-memory authoritative index of every entity and relationship.
//!
//! # Responsibility
//! - O(1) lookup by id for each entity kind, tombstones included.
//! - Secondary indices by parent: board→columns, board→tasks,
//!   column→tasks, story→tasks, task→comments.
//! - Referential checks used by every planned write and by import.
//!
//! # Invariants
//! - Only [`crate::state::State::apply`] mutates a published store, and only
//!   after the matching unit was committed to disk.
//! - A task's story color lives on the story only; [`TaskView`] derives it
//!   at read time.
//! - Listings are deterministic: columns by position, tasks by id, comments
//!   by `(created_at, id)`.

pub mod allocator;

use crate::error::{KanbanError, KanbanResult};
use crate::model::board::{Board, Column};
use crate::model::comment::Comment;
use crate::model::entity::{Entity, EntityKind, LifecycleState, Resolved, Tombstone};
use crate::clock::DateRange;
use crate::model::ids::{is_valid_story_code, BoardId, ColumnId, CommentId, StoryId, TaskId};
use crate::model::review::WeeklyReview;
use crate::model::story::Story;
use crate::model::task::{RehomeLink, Task, TaskView};
use allocator::{IdentityAllocator, SequenceCounter};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Parent selector for [`IntegrityStore::list_by_parent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// Columns of a board, by position.
    BoardColumns(BoardId),
    /// Tasks placed on a board.
    BoardTasks(BoardId),
    /// Tasks sitting in a column.
    ColumnTasks(ColumnId),
    /// Tasks owned by a story.
    StoryTasks(StoryId),
    /// Comments on a task.
    TaskComments(TaskId),
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityStore {
    boards: HashMap<BoardId, Board>,
    columns: HashMap<ColumnId, Column>,
    stories: HashMap<StoryId, Story>,
    tasks: HashMap<TaskId, Task>,
    comments: HashMap<CommentId, Comment>,
    tombstones: HashMap<String, Tombstone>,
    rehome_links: HashMap<TaskId, RehomeLink>,
    reviews: HashMap<String, WeeklyReview>,
    allocator: IdentityAllocator,
    story_codes: HashMap<String, StoryId>,
    board_columns: HashMap<BoardId, BTreeSet<ColumnId>>,
    board_tasks: HashMap<BoardId, BTreeSet<TaskId>>,
    column_tasks: HashMap<ColumnId, BTreeSet<TaskId>>,
    story_tasks: HashMap<StoryId, BTreeSet<TaskId>>,
    task_comments: HashMap<TaskId, BTreeSet<CommentId>>,
}

impl IntegrityStore {
    pub fn board(&self, id: &str) -> Option<&Board> {
        self.boards.get(id)
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.get(id)
    }

    pub fn story(&self, id: &str) -> Option<&Story> {
        self.stories.get(id)
    }

    pub fn story_by_code(&self, code: &str) -> Option<&Story> {
        self.story_codes
            .get(code)
            .and_then(|story_id| self.stories.get(story_id))
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn comment(&self, id: &str) -> Option<&Comment> {
        self.comments.get(id)
    }

    pub fn tombstone(&self, id: &str) -> Option<&Tombstone> {
        self.tombstones.get(id)
    }

    pub fn allocator(&self) -> &IdentityAllocator {
        &self.allocator
    }

    pub fn rehome_link(&self, old_task_id: &TaskId) -> Option<&RehomeLink> {
        self.rehome_links.get(old_task_id)
    }

    pub fn review(&self, id: &str) -> Option<&WeeklyReview> {
        self.reviews.get(id)
    }

    pub fn reviews(&self) -> impl Iterator<Item = &WeeklyReview> {
        self.reviews.values()
    }

    /// Reviews whose window overlaps `range`, by window start, then
    /// creation time, then id.
    pub fn reviews_overlapping(&self, range: &DateRange) -> Vec<&WeeklyReview> {
        let mut found: Vec<&WeeklyReview> = self
            .reviews
            .values()
            .filter(|review| review.overlaps(range))
            .collect();
        found.sort_by(|left, right| {
            (left.date_range.start_ms, left.created_at, &left.id).cmp(&(
                right.date_range.start_ms,
                right.created_at,
                &right.id,
            ))
        });
        found
    }

    pub fn boards(&self) -> impl Iterator<Item = &Board> {
        self.boards.values()
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn stories(&self) -> impl Iterator<Item = &Story> {
        self.stories.values()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.values()
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &Tombstone> {
        self.tombstones.values()
    }

    pub fn rehome_links(&self) -> impl Iterator<Item = &RehomeLink> {
        self.rehome_links.values()
    }

    /// Number of live entities of one kind.
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Board => self.boards.len(),
            EntityKind::Column => self.columns.len(),
            EntityKind::Story => self.stories.len(),
            EntityKind::Task => self.tasks.len(),
            EntityKind::Comment => self.comments.len(),
        }
    }

    /// Live entity with this id, if any.
    pub fn live(&self, id: &str) -> Option<Entity> {
        if let Some(board) = self.boards.get(id) {
            return Some(Entity::Board(board.clone()));
        }
        if let Some(column) = self.columns.get(id) {
            return Some(Entity::Column(column.clone()));
        }
        if let Some(story) = self.stories.get(id) {
            return Some(Entity::Story(story.clone()));
        }
        if let Some(comment) = self.comments.get(id) {
            return Some(Entity::Comment(comment.clone()));
        }
        TaskId::parse(id)
            .and_then(|task_id| self.tasks.get(&task_id))
            .map(|task| Entity::Task(task.clone()))
    }

    /// Resolves an id to its live record or its tombstone.
    ///
    /// Dangling ids left in other entities' history resolve here instead of
    /// failing.
    pub fn get(&self, id: &str) -> Option<Resolved> {
        self.live(id).map(Resolved::Live).or_else(|| {
            self.tombstones
                .get(id)
                .map(|tombstone| Resolved::Tombstone(tombstone.clone()))
        })
    }

    /// Lists children of a parent. Archived children are skipped unless
    /// `include_archived` is set.
    pub fn list_by_parent(&self, parent: &ParentRef, include_archived: bool) -> Vec<Entity> {
        let visible = |state: LifecycleState| include_archived || state == LifecycleState::Active;
        match parent {
            ParentRef::BoardColumns(board_id) => self
                .columns_of_board(board_id)
                .into_iter()
                .filter(|column| visible(column.state))
                .map(|column| Entity::Column(column.clone()))
                .collect(),
            ParentRef::BoardTasks(board_id) => {
                self.collect_tasks(self.board_tasks.get(board_id), visible)
            }
            ParentRef::ColumnTasks(column_id) => {
                self.collect_tasks(self.column_tasks.get(column_id), visible)
            }
            ParentRef::StoryTasks(story_id) => {
                self.collect_tasks(self.story_tasks.get(story_id), visible)
            }
            ParentRef::TaskComments(task_id) => self
                .comments_of_task(task_id)
                .into_iter()
                .filter(|comment| visible(comment.state))
                .map(|comment| Entity::Comment(comment.clone()))
                .collect(),
        }
    }

    /// All columns of a board ordered by position, archived included.
    pub fn columns_of_board(&self, board_id: &str) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self
            .board_columns
            .get(board_id)
            .into_iter()
            .flatten()
            .filter_map(|column_id| self.columns.get(column_id))
            .collect();
        columns.sort_by(|left, right| {
            left.position
                .cmp(&right.position)
                .then_with(|| left.id.cmp(&right.id))
        });
        columns
    }

    /// All comments of a task ordered by `(created_at, id)`.
    pub fn comments_of_task(&self, task_id: &TaskId) -> Vec<&Comment> {
        let mut comments: Vec<&Comment> = self
            .task_comments
            .get(task_id)
            .into_iter()
            .flatten()
            .filter_map(|comment_id| self.comments.get(comment_id))
            .collect();
        comments.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        comments
    }

    pub fn task_ids_of_story(&self, story_id: &str) -> impl Iterator<Item = &TaskId> {
        self.story_tasks.get(story_id).into_iter().flatten()
    }

    pub fn task_ids_in_column(&self, column_id: &str) -> impl Iterator<Item = &TaskId> {
        self.column_tasks.get(column_id).into_iter().flatten()
    }

    pub fn task_ids_on_board(&self, board_id: &str) -> impl Iterator<Item = &TaskId> {
        self.board_tasks.get(board_id).into_iter().flatten()
    }

    /// Task joined with its story's display attributes.
    pub fn task_view(&self, task_id: &TaskId) -> Option<TaskView> {
        let task = self.tasks.get(task_id)?;
        let story = self.stories.get(&task.story_id)?;
        Some(TaskView {
            task: task.clone(),
            story_code: story.code.clone(),
            story_title: story.title.clone(),
            story_color: story.color.clone(),
        })
    }

    /// Owning story of a task, live or tombstoned.
    ///
    /// A tombstoned task keeps no fields, so its story comes from the
    /// counter that minted its id.
    pub fn story_of_task(&self, task_id: &TaskId) -> Option<StoryId> {
        match self.tasks.get(task_id) {
            Some(task) => Some(task.story_id.clone()),
            None => self
                .allocator
                .counter(task_id.story_code())
                .map(|counter| counter.story_id.clone()),
        }
    }

    /// Follows rehome links from `task_id` to the task that currently
    /// represents it.
    pub fn resolve_rehomed(&self, task_id: &TaskId) -> TaskId {
        let mut current = task_id.clone();
        for _ in 0..=self.rehome_links.len() {
            match self.rehome_links.get(&current) {
                Some(link) => current = link.new_task_id.clone(),
                None => break,
            }
        }
        current
    }

    /// Plans the next task id under a live story.
    pub fn plan_task_id(&self, story_code: &str) -> KanbanResult<(TaskId, SequenceCounter)> {
        if self.story_by_code(story_code).is_none() {
            return Err(KanbanError::UnknownStory(story_code.to_string()));
        }
        self.allocator.plan_allocation(story_code)
    }

    pub(crate) fn check_column(&self, column: &Column) -> KanbanResult<()> {
        if !self.boards.contains_key(&column.board_id) {
            return Err(KanbanError::integrity(format!(
                "column {} references missing board {}",
                column.id, column.board_id
            )));
        }
        let clash = self
            .columns_of_board(&column.board_id)
            .into_iter()
            .any(|other| other.id != column.id && other.position == column.position);
        if clash {
            return Err(KanbanError::integrity(format!(
                "position {} is already used on board {}",
                column.position, column.board_id
            )));
        }
        Ok(())
    }

    pub(crate) fn check_story(&self, story: &Story) -> KanbanResult<()> {
        if !is_valid_story_code(&story.code) {
            return Err(KanbanError::Validation(format!(
                "story code `{}` is malformed",
                story.code
            )));
        }
        if self
            .story_codes
            .get(&story.code)
            .is_some_and(|owner| owner != &story.id)
        {
            return Err(KanbanError::integrity(format!(
                "story code {} is already in use",
                story.code
            )));
        }
        if self.allocator.is_reserved_by_other(&story.code, &story.id) {
            return Err(KanbanError::integrity(format!(
                "story code {} is reserved by another story",
                story.code
            )));
        }
        Ok(())
    }

    pub(crate) fn check_task(&self, task: &Task) -> KanbanResult<()> {
        let story = match self.stories.get(&task.story_id) {
            Some(story) => story,
            None if self.tombstones.contains_key(&task.story_id) => {
                return Err(KanbanError::integrity(format!(
                    "task {} references deleted story {}",
                    task.id, task.story_id
                )));
            }
            None => {
                return Err(KanbanError::integrity(format!(
                    "task {} references missing story {}",
                    task.id, task.story_id
                )));
            }
        };
        if story.code != task.id.story_code() {
            return Err(KanbanError::integrity(format!(
                "task {} does not belong to story {}",
                task.id, story.code
            )));
        }
        let column = self.columns.get(&task.column_id).ok_or_else(|| {
            KanbanError::integrity(format!(
                "task {} references missing column {}",
                task.id, task.column_id
            ))
        })?;
        if column.board_id != task.board_id || !self.boards.contains_key(&task.board_id) {
            return Err(KanbanError::integrity(format!(
                "task {} column {} is not on board {}",
                task.id, task.column_id, task.board_id
            )));
        }
        Ok(())
    }

    pub(crate) fn check_comment(&self, comment: &Comment) -> KanbanResult<()> {
        if !self.tasks.contains_key(&comment.task_id) {
            return Err(KanbanError::integrity(format!(
                "comment {} references missing task {}",
                comment.id, comment.task_id
            )));
        }
        Ok(())
    }

    /// Scope ids of a review must name a board or story, live or deleted.
    pub(crate) fn check_review(&self, review: &WeeklyReview) -> KanbanResult<()> {
        if review.date_range.start_ms > review.date_range.end_ms {
            return Err(KanbanError::Validation(format!(
                "review {} window ends before it starts",
                review.id
            )));
        }
        let missing_board = review.board_ids.iter().find(|id| {
            !self.boards.contains_key(id.as_str()) && !self.tombstones.contains_key(id.as_str())
        });
        let missing_story = review.story_ids.iter().find(|id| {
            !self.stories.contains_key(id.as_str()) && !self.tombstones.contains_key(id.as_str())
        });
        if let Some(missing) = missing_board.or(missing_story) {
            return Err(KanbanError::integrity(format!(
                "review {} references unknown record {missing}",
                review.id
            )));
        }
        Ok(())
    }

    fn task_resolvable(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id) || self.tombstones.contains_key(&task_id.to_string())
    }

    /// Checks every referential invariant over the whole store.
    pub fn validate_all(&self) -> KanbanResult<()> {
        for column in self.columns.values() {
            self.check_column(column)?;
        }
        for story in self.stories.values() {
            self.check_story(story)?;
            match self.allocator.counter(&story.code) {
                Some(counter) if counter.story_id == story.id => {}
                _ => {
                    return Err(KanbanError::integrity(format!(
                        "story {} has no sequence counter",
                        story.code
                    )));
                }
            }
        }
        for task in self.tasks.values() {
            self.check_task(task)?;
            let issued_past = self
                .allocator
                .counter(task.id.story_code())
                .is_some_and(|counter| counter.next_seq > task.id.seq());
            if !issued_past {
                return Err(KanbanError::integrity(format!(
                    "task {} was not issued by its story counter",
                    task.id
                )));
            }
        }
        for comment in self.comments.values() {
            self.check_comment(comment)?;
        }
        for link in self.rehome_links.values() {
            if !self.task_resolvable(&link.old_task_id) || !self.task_resolvable(&link.new_task_id)
            {
                return Err(KanbanError::integrity(format!(
                    "rehome link {} -> {} is dangling",
                    link.old_task_id, link.new_task_id
                )));
            }
        }
        for review in self.reviews.values() {
            self.check_review(review)?;
        }
        for tombstone in self.tombstones.values() {
            if self.live(&tombstone.id).is_some() {
                return Err(KanbanError::integrity(format!(
                    "{} is both live and deleted",
                    tombstone.id
                )));
            }
        }
        Ok(())
    }

    /// Inserts or replaces a live record, keeping indices in step.
    pub(crate) fn put(&mut self, entity: Entity) {
        match entity {
            Entity::Board(board) => {
                self.boards.insert(board.id.clone(), board);
            }
            Entity::Column(column) => {
                if let Some(previous) = self.columns.get(&column.id) {
                    let previous_board = previous.board_id.clone();
                    index_remove(&mut self.board_columns, &previous_board, &column.id);
                }
                index_insert(&mut self.board_columns, &column.board_id, column.id.clone());
                self.columns.insert(column.id.clone(), column);
            }
            Entity::Story(story) => {
                if let Some(previous) = self.stories.get(&story.id) {
                    if previous.code != story.code {
                        self.story_codes.remove(&previous.code);
                    }
                }
                self.story_codes.insert(story.code.clone(), story.id.clone());
                self.stories.insert(story.id.clone(), story);
            }
            Entity::Task(task) => {
                self.unindex_task(&task.id);
                index_insert(&mut self.board_tasks, &task.board_id, task.id.clone());
                index_insert(&mut self.column_tasks, &task.column_id, task.id.clone());
                index_insert(&mut self.story_tasks, &task.story_id, task.id.clone());
                self.tasks.insert(task.id.clone(), task);
            }
            Entity::Comment(comment) => {
                index_insert(&mut self.task_comments, &comment.task_id, comment.id.clone());
                self.comments.insert(comment.id.clone(), comment);
            }
        }
    }

    /// Removes the live record of `tombstone.id` and keeps the tombstone.
    pub(crate) fn put_tombstone(&mut self, tombstone: Tombstone) {
        match tombstone.kind {
            EntityKind::Board => {
                self.boards.remove(&tombstone.id);
                self.board_columns.remove(&tombstone.id);
                self.board_tasks.remove(&tombstone.id);
            }
            EntityKind::Column => {
                if let Some(column) = self.columns.remove(&tombstone.id) {
                    index_remove(&mut self.board_columns, &column.board_id, &column.id);
                }
                self.column_tasks.remove(&tombstone.id);
            }
            EntityKind::Story => {
                if let Some(story) = self.stories.remove(&tombstone.id) {
                    if self.story_codes.get(&story.code) == Some(&story.id) {
                        self.story_codes.remove(&story.code);
                    }
                }
                self.story_tasks.remove(&tombstone.id);
            }
            EntityKind::Task => {
                if let Some(task_id) = TaskId::parse(&tombstone.id) {
                    self.unindex_task(&task_id);
                    self.tasks.remove(&task_id);
                    self.task_comments.remove(&task_id);
                }
            }
            EntityKind::Comment => {
                if let Some(comment) = self.comments.remove(&tombstone.id) {
                    index_remove(&mut self.task_comments, &comment.task_id, &comment.id);
                }
            }
        }
        self.tombstones.insert(tombstone.id.clone(), tombstone);
    }

    pub(crate) fn put_counter(&mut self, counter: SequenceCounter) {
        self.allocator.put(counter);
    }

    pub(crate) fn drop_unissued_counter(&mut self, story_code: &str) {
        self.allocator.remove_unissued(story_code);
    }

    pub(crate) fn put_rehome_link(&mut self, link: RehomeLink) {
        self.rehome_links.insert(link.old_task_id.clone(), link);
    }

    pub(crate) fn put_review(&mut self, review: WeeklyReview) {
        self.reviews.insert(review.id.clone(), review);
    }

    fn unindex_task(&mut self, task_id: &TaskId) {
        if let Some(previous) = self.tasks.get(task_id) {
            let (board_id, column_id, story_id) = (
                previous.board_id.clone(),
                previous.column_id.clone(),
                previous.story_id.clone(),
            );
            index_remove(&mut self.board_tasks, &board_id, task_id);
            index_remove(&mut self.column_tasks, &column_id, task_id);
            index_remove(&mut self.story_tasks, &story_id, task_id);
        }
    }

    fn collect_tasks(
        &self,
        ids: Option<&BTreeSet<TaskId>>,
        visible: impl Fn(LifecycleState) -> bool,
    ) -> Vec<Entity> {
        ids.into_iter()
            .flatten()
            .filter_map(|task_id| self.tasks.get(task_id))
            .filter(|task| visible(task.state))
            .map(|task| Entity::Task(task.clone()))
            .collect()
    }
}

fn index_insert<K, V>(index: &mut HashMap<K, BTreeSet<V>>, key: &K, value: V)
where
    K: Hash + Eq + Clone,
    V: Ord,
{
    index.entry(key.clone()).or_default().insert(value);
}

fn index_remove<K, V>(index: &mut HashMap<K, BTreeSet<V>>, key: &K, value: &V)
where
    K: Hash + Eq,
    V: Ord,
{
    let now_empty = match index.get_mut(key) {
        Some(values) => {
            values.remove(value);
            values.is_empty()
        }
        None => false,
    };
    if now_empty {
        index.remove(key);
    }
}
