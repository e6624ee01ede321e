//! Text search over stories, tasks and comments.
//!
//! # Responsibility
//! - Case-insensitive literal matching over one snapshot.
//! - Return typed hits with stable ids and a bracketed snippet.
//!
//! # Invariants
//! - Blank text returns no hits.
//! - Archived records are skipped unless requested.
//! - Hits are ordered by kind (stories, tasks, comments), then id.

use crate::error::{KanbanError, KanbanResult};
use crate::model::entity::{EntityKind, LifecycleState};
use crate::model::ids::{BoardId, StoryId, TaskId};
use crate::store::IntegrityStore;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const SNIPPET_CONTEXT_CHARS: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilters {
    pub board_id: Option<BoardId>,
    pub story_id: Option<StoryId>,
    /// Kinds to search; empty means stories, tasks and comments.
    pub kinds: Vec<EntityKind>,
    pub include_archived: bool,
    pub limit: usize,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            board_id: None,
            story_id: None,
            kinds: Vec::new(),
            include_archived: false,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl SearchFilters {
    fn wants(&self, kind: EntityKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    fn visible(&self, state: LifecycleState) -> bool {
        self.include_archived || state == LifecycleState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub kind: EntityKind,
    pub id: String,
    /// Name of the first matching field.
    pub field: &'static str,
    pub snippet: String,
}

/// Searches one store snapshot.
pub fn search(
    store: &IntegrityStore,
    text: &str,
    filters: &SearchFilters,
) -> KanbanResult<Vec<SearchHit>> {
    let needle = text.trim();
    if needle.is_empty() || filters.limit == 0 {
        return Ok(Vec::new());
    }
    let matcher = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .map_err(|err| KanbanError::Validation(format!("unsupported search text: {err}")))?;

    let mut hits = Vec::new();
    if filters.wants(EntityKind::Story) {
        hits.extend(search_stories(store, &matcher, filters));
    }
    if filters.wants(EntityKind::Task) {
        hits.extend(search_tasks(store, &matcher, filters));
    }
    if filters.wants(EntityKind::Comment) {
        hits.extend(search_comments(store, &matcher, filters));
    }
    hits.truncate(filters.limit);
    Ok(hits)
}

fn search_stories(
    store: &IntegrityStore,
    matcher: &Regex,
    filters: &SearchFilters,
) -> Vec<SearchHit> {
    let mut stories: Vec<_> = store
        .stories()
        .filter(|story| filters.visible(story.state))
        .filter(|story| filters.story_id.as_ref().map_or(true, |id| id == &story.id))
        .filter(|story| {
            filters.board_id.as_ref().map_or(true, |board_id| {
                store
                    .task_ids_of_story(&story.id)
                    .filter_map(|task_id| store.task(task_id))
                    .any(|task| &task.board_id == board_id)
            })
        })
        .collect();
    stories.sort_by(|left, right| left.id.cmp(&right.id));

    stories
        .into_iter()
        .filter_map(|story| {
            first_match(
                matcher,
                &[
                    ("code", story.code.as_str()),
                    ("title", story.title.as_str()),
                    ("description", story.description.as_str()),
                ],
            )
            .map(|(field, snippet)| SearchHit {
                kind: EntityKind::Story,
                id: story.id.clone(),
                field,
                snippet,
            })
        })
        .collect()
}

fn search_tasks(store: &IntegrityStore, matcher: &Regex, filters: &SearchFilters) -> Vec<SearchHit> {
    let mut tasks: Vec<_> = store
        .tasks()
        .filter(|task| filters.visible(task.state))
        .filter(|task| filters.story_id.as_ref().map_or(true, |id| id == &task.story_id))
        .filter(|task| filters.board_id.as_ref().map_or(true, |id| id == &task.board_id))
        .collect();
    tasks.sort_by(|left, right| left.id.cmp(&right.id));

    tasks
        .into_iter()
        .filter_map(|task| {
            let id = task.id.to_string();
            let tags = task.tags.join(" ");
            let found = first_match(
                matcher,
                &[
                    ("id", id.as_str()),
                    ("title", task.title.as_str()),
                    ("description", task.description.as_str()),
                    ("tags", tags.as_str()),
                ],
            );
            found.map(|(field, snippet)| SearchHit {
                kind: EntityKind::Task,
                id,
                field,
                snippet,
            })
        })
        .collect()
}

fn search_comments(
    store: &IntegrityStore,
    matcher: &Regex,
    filters: &SearchFilters,
) -> Vec<SearchHit> {
    let task_in_scope = |task_id: &TaskId| match store.task(task_id) {
        Some(task) => {
            filters.visible(task.state)
                && filters.story_id.as_ref().map_or(true, |id| id == &task.story_id)
                && filters.board_id.as_ref().map_or(true, |id| id == &task.board_id)
        }
        None => false,
    };
    let mut comments: Vec<_> = store
        .comments()
        .filter(|comment| filters.visible(comment.state))
        .filter(|comment| task_in_scope(&comment.task_id))
        .collect();
    comments.sort_by(|left, right| left.id.cmp(&right.id));

    comments
        .into_iter()
        .filter_map(|comment| {
            first_match(matcher, &[("body", comment.body.as_str())]).map(|(field, snippet)| {
                SearchHit {
                    kind: EntityKind::Comment,
                    id: comment.id.clone(),
                    field,
                    snippet,
                }
            })
        })
        .collect()
}

fn first_match(matcher: &Regex, fields: &[(&'static str, &str)]) -> Option<(&'static str, String)> {
    fields.iter().find_map(|(field, value)| {
        matcher
            .find(value)
            .map(|found| (*field, snippet(value, found.start(), found.end())))
    })
}

/// Marks the match with `[` `]` and keeps a few characters of context.
fn snippet(value: &str, start: usize, end: usize) -> String {
    let before: String = {
        let chars: Vec<char> = value[..start].chars().collect();
        let skip = chars.len().saturating_sub(SNIPPET_CONTEXT_CHARS);
        let prefix = if skip > 0 { "..." } else { "" };
        format!("{prefix}{}", chars[skip..].iter().collect::<String>())
    };
    let after: String = {
        let rest = &value[end..];
        let kept: String = rest.chars().take(SNIPPET_CONTEXT_CHARS).collect();
        if rest.chars().count() > SNIPPET_CONTEXT_CHARS {
            format!("{kept}...")
        } else {
            kept
        }
    };
    let flattened = format!("{before}[{}]{after}", &value[start..end]);
    flattened.replace(['\n', '\r'], " ")
}
