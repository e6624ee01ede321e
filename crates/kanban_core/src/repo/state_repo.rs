//! SQLite-backed state repository.
//!
//! # Responsibility
//! - Map entity tables, counters, rehome links, history and weekly reviews
//!   to [`State`].
//! - Persist a [`Unit`] inside one `IMMEDIATE` transaction.
//!
//! # Invariants
//! - Counter upserts go through `ON CONFLICT DO UPDATE` so the decrement
//!   trigger sees every change.
//! - History and review rows are insert-only; triggers reject updates and
//!   deletes.

use super::{RepoError, RepoResult};
use crate::clock::DateRange;
use crate::config::{EngineConfig, Storage};
use crate::db::{open_db, open_db_in_memory};
use crate::model::board::{Board, BoardSettings, Column};
use crate::model::comment::Comment;
use crate::model::entity::{Entity, EntityKind, LifecycleState, Tombstone};
use crate::model::history::{HistoryEntry, HistoryKind, HistoryPayload};
use crate::model::ids::TaskId;
use crate::model::review::WeeklyReview;
use crate::model::story::Story;
use crate::model::task::{RehomeLink, Task};
use crate::state::{State, Unit, Write};
use crate::store::allocator::SequenceCounter;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Storage contract used by the service layer.
pub(crate) trait StateRepository {
    /// Reads every persisted row into a fresh state.
    fn load_state(&self) -> RepoResult<State>;
    /// Commits one unit atomically and durably.
    fn commit(&self, unit: &Unit) -> RepoResult<()>;
}

pub(crate) struct SqliteStateRepository {
    conn: Connection,
}

impl SqliteStateRepository {
    pub(crate) fn open(config: &EngineConfig) -> RepoResult<Self> {
        let conn = match &config.storage {
            Storage::File(path) => open_db(path)?,
            Storage::InMemory => open_db_in_memory()?,
        };
        conn.busy_timeout(config.busy_timeout)?;
        Ok(Self { conn })
    }
}

impl StateRepository for SqliteStateRepository {
    fn load_state(&self) -> RepoResult<State> {
        let mut state = State::default();

        for board in load_rows(&self.conn, BOARD_SELECT_SQL, parse_board_row)? {
            state.store.put(Entity::Board(board));
        }
        for column in load_rows(&self.conn, COLUMN_SELECT_SQL, parse_column_row)? {
            state.store.put(Entity::Column(column));
        }
        for story in load_rows(&self.conn, STORY_SELECT_SQL, parse_story_row)? {
            state.store.put(Entity::Story(story));
        }
        for task in load_rows(&self.conn, TASK_SELECT_SQL, parse_task_row)? {
            state.store.put(Entity::Task(task));
        }
        for comment in load_rows(&self.conn, COMMENT_SELECT_SQL, parse_comment_row)? {
            state.store.put(Entity::Comment(comment));
        }
        for tombstone in load_rows(&self.conn, TOMBSTONE_SELECT_SQL, parse_tombstone_row)? {
            state.store.put_tombstone(tombstone);
        }
        for counter in load_rows(&self.conn, COUNTER_SELECT_SQL, parse_counter_row)? {
            state.store.put_counter(counter);
        }
        for link in load_rows(&self.conn, LINK_SELECT_SQL, parse_link_row)? {
            state.store.put_rehome_link(link);
        }
        for entry in load_rows(&self.conn, HISTORY_SELECT_SQL, parse_history_row)? {
            state.ledger.append(entry);
        }
        for review in load_rows(&self.conn, REVIEW_SELECT_SQL, parse_review_row)? {
            state.store.put_review(review);
        }

        Ok(state)
    }

    fn commit(&self, unit: &Unit) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        for write in &unit.writes {
            apply_write(&tx, write)?;
        }
        for entry in &unit.history {
            insert_history(&tx, entry)?;
        }
        tx.commit()?;
        Ok(())
    }
}

const BOARD_SELECT_SQL: &str =
    "SELECT id, name, settings, state, created_at FROM boards ORDER BY id;";
const COLUMN_SELECT_SQL: &str =
    "SELECT id, board_id, name, position, state, created_at FROM board_columns ORDER BY id;";
const STORY_SELECT_SQL: &str = "SELECT
    id, code, title, description, color, status, tags, state, created_at
FROM stories ORDER BY id;";
const TASK_SELECT_SQL: &str = "SELECT
    id, story_id, board_id, column_id, title, description, priority, estimate,
    due_date, tags, state, created_at
FROM tasks ORDER BY id;";
const COMMENT_SELECT_SQL: &str =
    "SELECT id, task_id, author, body, state, created_at FROM comments ORDER BY id;";
const TOMBSTONE_SELECT_SQL: &str = "SELECT id, kind, deleted_at FROM tombstones ORDER BY id;";
const COUNTER_SELECT_SQL: &str =
    "SELECT story_code, story_id, next_seq FROM story_sequences ORDER BY story_code;";
const LINK_SELECT_SQL: &str =
    "SELECT old_task_id, new_task_id, created_at FROM rehome_links ORDER BY old_task_id;";
const HISTORY_SELECT_SQL: &str = "SELECT
    seq, id, entity_kind, entity_id, timestamp, kind, payload
FROM history ORDER BY seq ASC;";
const REVIEW_SELECT_SQL: &str = "SELECT
    id, board_ids, story_ids, start_ms, end_ms, plugin_id, summary_markdown, metadata,
    evidence_entry_ids, evidence_comment_ids, created_at
FROM weekly_reviews ORDER BY id;";

fn load_rows<T>(
    conn: &Connection,
    sql: &str,
    parse: fn(&Row<'_>) -> RepoResult<T>,
) -> RepoResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse(row)?);
    }
    Ok(items)
}

fn apply_write(tx: &Transaction<'_>, write: &Write) -> RepoResult<()> {
    match write {
        Write::Put(entity) => upsert_entity(tx, entity),
        Write::Tombstone(tombstone) => {
            tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1;", table_for(tombstone.kind)),
                [tombstone.id.as_str()],
            )?;
            tx.execute(
                "INSERT INTO tombstones (id, kind, deleted_at) VALUES (?1, ?2, ?3);",
                params![
                    tombstone.id.as_str(),
                    tombstone.kind.as_str(),
                    tombstone.deleted_at
                ],
            )?;
            Ok(())
        }
        Write::Counter(counter) => {
            tx.execute(
                "INSERT INTO story_sequences (story_code, story_id, next_seq)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(story_code) DO UPDATE SET
                    story_id = excluded.story_id,
                    next_seq = max(next_seq, excluded.next_seq);",
                params![
                    counter.story_code.as_str(),
                    counter.story_id.as_str(),
                    u64_to_db(counter.next_seq, "story_sequences.next_seq")?
                ],
            )?;
            Ok(())
        }
        Write::DropCounter(story_code) => {
            tx.execute(
                "DELETE FROM story_sequences WHERE story_code = ?1 AND next_seq = 1;",
                [story_code.as_str()],
            )?;
            Ok(())
        }
        Write::RehomeLink(link) => {
            tx.execute(
                "INSERT INTO rehome_links (old_task_id, new_task_id, created_at)
                 VALUES (?1, ?2, ?3);",
                params![
                    link.old_task_id.to_string(),
                    link.new_task_id.to_string(),
                    link.created_at
                ],
            )?;
            Ok(())
        }
        Write::Review(review) => insert_review(tx, review),
    }
}

fn insert_review(tx: &Transaction<'_>, review: &WeeklyReview) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO weekly_reviews (
            id, board_ids, story_ids, start_ms, end_ms, plugin_id, summary_markdown,
            metadata, evidence_entry_ids, evidence_comment_ids, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
        params![
            review.id.as_str(),
            to_json(&review.board_ids, "weekly_reviews.board_ids")?,
            to_json(&review.story_ids, "weekly_reviews.story_ids")?,
            review.date_range.start_ms,
            review.date_range.end_ms,
            review.plugin_id.as_str(),
            review.summary_markdown.as_str(),
            to_json(&review.metadata, "weekly_reviews.metadata")?,
            to_json(&review.evidence_entry_ids, "weekly_reviews.evidence_entry_ids")?,
            to_json(&review.evidence_comment_ids, "weekly_reviews.evidence_comment_ids")?,
            review.created_at
        ],
    )?;
    Ok(())
}

fn upsert_entity(tx: &Transaction<'_>, entity: &Entity) -> RepoResult<()> {
    match entity {
        Entity::Board(board) => {
            tx.execute(
                "INSERT INTO boards (id, name, settings, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    settings = excluded.settings,
                    state = excluded.state;",
                params![
                    board.id.as_str(),
                    board.name.as_str(),
                    to_json(&board.settings, "boards.settings")?,
                    board.state.as_str(),
                    board.created_at
                ],
            )?;
        }
        Entity::Column(column) => {
            tx.execute(
                "INSERT INTO board_columns (id, board_id, name, position, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    board_id = excluded.board_id,
                    name = excluded.name,
                    position = excluded.position,
                    state = excluded.state;",
                params![
                    column.id.as_str(),
                    column.board_id.as_str(),
                    column.name.as_str(),
                    column.position,
                    column.state.as_str(),
                    column.created_at
                ],
            )?;
        }
        Entity::Story(story) => {
            tx.execute(
                "INSERT INTO stories (
                    id, code, title, description, color, status, tags, state, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    code = excluded.code,
                    title = excluded.title,
                    description = excluded.description,
                    color = excluded.color,
                    status = excluded.status,
                    tags = excluded.tags,
                    state = excluded.state;",
                params![
                    story.id.as_str(),
                    story.code.as_str(),
                    story.title.as_str(),
                    story.description.as_str(),
                    story.color.as_str(),
                    story.status.as_str(),
                    to_json(&story.tags, "stories.tags")?,
                    story.state.as_str(),
                    story.created_at
                ],
            )?;
        }
        Entity::Task(task) => {
            tx.execute(
                "INSERT INTO tasks (
                    id, story_id, board_id, column_id, title, description, priority,
                    estimate, due_date, tags, state, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    story_id = excluded.story_id,
                    board_id = excluded.board_id,
                    column_id = excluded.column_id,
                    title = excluded.title,
                    description = excluded.description,
                    priority = excluded.priority,
                    estimate = excluded.estimate,
                    due_date = excluded.due_date,
                    tags = excluded.tags,
                    state = excluded.state;",
                params![
                    task.id.to_string(),
                    task.story_id.as_str(),
                    task.board_id.as_str(),
                    task.column_id.as_str(),
                    task.title.as_str(),
                    task.description.as_str(),
                    task.priority.as_str(),
                    task.estimate.as_str(),
                    task.due_date.as_deref(),
                    to_json(&task.tags, "tasks.tags")?,
                    task.state.as_str(),
                    task.created_at
                ],
            )?;
        }
        Entity::Comment(comment) => {
            tx.execute(
                "INSERT INTO comments (id, task_id, author, body, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    author = excluded.author,
                    body = excluded.body,
                    state = excluded.state;",
                params![
                    comment.id.as_str(),
                    comment.task_id.to_string(),
                    comment.author.as_str(),
                    comment.body.as_str(),
                    comment.state.as_str(),
                    comment.created_at
                ],
            )?;
        }
    }
    Ok(())
}

fn insert_history(tx: &Transaction<'_>, entry: &HistoryEntry) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO history (seq, id, entity_kind, entity_id, timestamp, kind, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            u64_to_db(entry.seq, "history.seq")?,
            entry.id.as_str(),
            entry.entity_kind.as_str(),
            entry.entity_id.as_str(),
            entry.timestamp,
            entry.kind.as_str(),
            to_json(&entry.payload, "history.payload")?
        ],
    )?;
    Ok(())
}

fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Board => "boards",
        EntityKind::Column => "board_columns",
        EntityKind::Story => "stories",
        EntityKind::Task => "tasks",
        EntityKind::Comment => "comments",
    }
}

fn parse_board_row(row: &Row<'_>) -> RepoResult<Board> {
    let settings: String = row.get("settings")?;
    Ok(Board {
        id: row.get("id")?,
        name: row.get("name")?,
        settings: from_json::<BoardSettings>(&settings, "boards.settings")?,
        state: parse_state(row, "boards.state")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_column_row(row: &Row<'_>) -> RepoResult<Column> {
    Ok(Column {
        id: row.get("id")?,
        board_id: row.get("board_id")?,
        name: row.get("name")?,
        position: row.get("position")?,
        state: parse_state(row, "board_columns.state")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_story_row(row: &Row<'_>) -> RepoResult<Story> {
    let tags: String = row.get("tags")?;
    Ok(Story {
        id: row.get("id")?,
        code: row.get("code")?,
        title: row.get("title")?,
        description: row.get("description")?,
        color: row.get("color")?,
        status: row.get("status")?,
        tags: from_json(&tags, "stories.tags")?,
        state: parse_state(row, "stories.state")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let tags: String = row.get("tags")?;
    Ok(Task {
        id: parse_task_id(row, "id", "tasks.id")?,
        story_id: row.get("story_id")?,
        board_id: row.get("board_id")?,
        column_id: row.get("column_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        priority: row.get("priority")?,
        estimate: row.get("estimate")?,
        due_date: row.get("due_date")?,
        tags: from_json(&tags, "tasks.tags")?,
        state: parse_state(row, "tasks.state")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_comment_row(row: &Row<'_>) -> RepoResult<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        task_id: parse_task_id(row, "task_id", "comments.task_id")?,
        author: row.get("author")?,
        body: row.get("body")?,
        state: parse_state(row, "comments.state")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_tombstone_row(row: &Row<'_>) -> RepoResult<Tombstone> {
    Ok(Tombstone {
        kind: parse_kind(row, "kind", "tombstones.kind")?,
        id: row.get("id")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn parse_counter_row(row: &Row<'_>) -> RepoResult<SequenceCounter> {
    Ok(SequenceCounter {
        story_code: row.get("story_code")?,
        story_id: row.get("story_id")?,
        next_seq: u64_from_db(row.get("next_seq")?, "story_sequences.next_seq")?,
    })
}

fn parse_link_row(row: &Row<'_>) -> RepoResult<RehomeLink> {
    Ok(RehomeLink {
        old_task_id: parse_task_id(row, "old_task_id", "rehome_links.old_task_id")?,
        new_task_id: parse_task_id(row, "new_task_id", "rehome_links.new_task_id")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_history_row(row: &Row<'_>) -> RepoResult<HistoryEntry> {
    let kind_text: String = row.get("kind")?;
    let kind = HistoryKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid history kind `{kind_text}` in history.kind"))
    })?;
    let payload: String = row.get("payload")?;
    Ok(HistoryEntry {
        id: row.get("id")?,
        seq: u64_from_db(row.get("seq")?, "history.seq")?,
        entity_kind: parse_kind(row, "entity_kind", "history.entity_kind")?,
        entity_id: row.get("entity_id")?,
        timestamp: row.get("timestamp")?,
        kind,
        payload: from_json::<HistoryPayload>(&payload, "history.payload")?,
    })
}

fn parse_review_row(row: &Row<'_>) -> RepoResult<WeeklyReview> {
    let json_column = |field: &str| -> RepoResult<String> { Ok(row.get(field)?) };
    Ok(WeeklyReview {
        id: row.get("id")?,
        board_ids: from_json(&json_column("board_ids")?, "weekly_reviews.board_ids")?,
        story_ids: from_json(&json_column("story_ids")?, "weekly_reviews.story_ids")?,
        date_range: DateRange {
            start_ms: row.get("start_ms")?,
            end_ms: row.get("end_ms")?,
        },
        plugin_id: row.get("plugin_id")?,
        summary_markdown: row.get("summary_markdown")?,
        metadata: from_json(&json_column("metadata")?, "weekly_reviews.metadata")?,
        evidence_entry_ids: from_json(
            &json_column("evidence_entry_ids")?,
            "weekly_reviews.evidence_entry_ids",
        )?,
        evidence_comment_ids: from_json(
            &json_column("evidence_comment_ids")?,
            "weekly_reviews.evidence_comment_ids",
        )?,
        created_at: row.get("created_at")?,
    })
}

fn parse_state(row: &Row<'_>, column: &'static str) -> RepoResult<LifecycleState> {
    let value: String = row.get("state")?;
    LifecycleState::parse(&value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid state `{value}` in {column}")))
}

fn parse_kind(row: &Row<'_>, field: &str, column: &'static str) -> RepoResult<EntityKind> {
    let value: String = row.get(field)?;
    EntityKind::parse(&value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid entity kind `{value}` in {column}")))
}

fn parse_task_id(row: &Row<'_>, field: &str, column: &'static str) -> RepoResult<TaskId> {
    let value: String = row.get(field)?;
    TaskId::parse(&value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid task id `{value}` in {column}")))
}

fn to_json<T: Serialize>(value: &T, column: &'static str) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode {column}: {err}")))
}

fn from_json<T: DeserializeOwned>(value: &str, column: &'static str) -> RepoResult<T> {
    serde_json::from_str(value)
        .map_err(|err| RepoError::InvalidData(format!("invalid json in {column}: {err}")))
}

fn u64_to_db(value: u64, column: &'static str) -> RepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("value {value} overflows {column}")))
}

fn u64_from_db(value: i64, column: &'static str) -> RepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative value {value} in {column}")))
}
