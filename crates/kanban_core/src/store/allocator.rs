//! Per-story task sequence counters.
//!
//! # Responsibility
//! - Own the `story_code -> next_seq` mapping used to mint task ids.
//! - Plan allocations without mutating; the bumped counter is committed in
//!   the same atomic unit as the task it numbers.
//!
//! # Invariants
//! - `next_seq` starts at 1 and never decreases.
//! - A counter row outlives its story, so a code that ever issued a number
//!   stays reserved and no task id is issued twice.
//! - Restart recovery reads the persisted counters; ids are never rescanned.

use crate::error::{KanbanError, KanbanResult};
use crate::model::ids::{StoryId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted counter row for one story code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounter {
    pub story_code: String,
    pub story_id: StoryId,
    pub next_seq: u64,
}

impl SequenceCounter {
    pub fn new(story_code: impl Into<String>, story_id: impl Into<StoryId>) -> Self {
        Self {
            story_code: story_code.into(),
            story_id: story_id.into(),
            next_seq: 1,
        }
    }

    /// Whether any task id was ever issued under this code.
    pub fn has_issued(&self) -> bool {
        self.next_seq > 1
    }
}

/// Process-wide owner of all story sequence counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityAllocator {
    counters: BTreeMap<String, SequenceCounter>,
}

impl IdentityAllocator {
    pub fn counter(&self, story_code: &str) -> Option<&SequenceCounter> {
        self.counters.get(story_code)
    }

    /// Counters ordered by story code.
    pub fn counters(&self) -> impl Iterator<Item = &SequenceCounter> {
        self.counters.values()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Whether `story_code` is held by a counter owned by a story other than
    /// `story_id`.
    pub fn is_reserved_by_other(&self, story_code: &str, story_id: &str) -> bool {
        self.counters
            .get(story_code)
            .is_some_and(|counter| counter.story_id != story_id)
    }

    /// Plans the next id under `story_code`.
    ///
    /// Returns the id and the counter state to persist with it. Callers
    /// check that the story is live before planning.
    pub fn plan_allocation(&self, story_code: &str) -> KanbanResult<(TaskId, SequenceCounter)> {
        let counter = self
            .counters
            .get(story_code)
            .ok_or_else(|| KanbanError::UnknownStory(story_code.to_string()))?;
        let next_seq = counter.next_seq.checked_add(1).ok_or_else(|| {
            KanbanError::integrity(format!("sequence for story {story_code} is exhausted"))
        })?;
        let id = TaskId::new(story_code, counter.next_seq);
        let bumped = SequenceCounter {
            next_seq,
            ..counter.clone()
        };
        Ok((id, bumped))
    }

    /// Stores a counter, never lowering an existing `next_seq`.
    pub(crate) fn put(&mut self, counter: SequenceCounter) {
        match self.counters.get_mut(&counter.story_code) {
            Some(existing) => {
                existing.story_id = counter.story_id;
                existing.next_seq = existing.next_seq.max(counter.next_seq);
            }
            None => {
                self.counters.insert(counter.story_code.clone(), counter);
            }
        }
    }

    /// Drops a counter that never issued a number (story code re-key).
    pub(crate) fn remove_unissued(&mut self, story_code: &str) {
        if self
            .counters
            .get(story_code)
            .is_some_and(|counter| !counter.has_issued())
        {
            self.counters.remove(story_code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityAllocator, SequenceCounter};

    #[test]
    fn planning_does_not_mutate() {
        let mut allocator = IdentityAllocator::default();
        allocator.put(SequenceCounter::new("ALPHA", "story_a"));

        let (first, bumped) = allocator.plan_allocation("ALPHA").unwrap();
        let (again, _) = allocator.plan_allocation("ALPHA").unwrap();
        assert_eq!(first.to_string(), "ALPHA-001");
        assert_eq!(again, first);
        assert_eq!(bumped.next_seq, 2);

        allocator.put(bumped);
        let (second, _) = allocator.plan_allocation("ALPHA").unwrap();
        assert_eq!(second.to_string(), "ALPHA-002");
    }

    #[test]
    fn counters_never_decrease() {
        let mut allocator = IdentityAllocator::default();
        let mut counter = SequenceCounter::new("OPS", "story_ops");
        counter.next_seq = 9;
        allocator.put(counter);
        allocator.put(SequenceCounter::new("OPS", "story_ops"));
        assert_eq!(allocator.counter("OPS").unwrap().next_seq, 9);

        allocator.remove_unissued("OPS");
        assert!(allocator.counter("OPS").is_some());
    }

    #[test]
    fn unknown_code_fails() {
        let allocator = IdentityAllocator::default();
        assert!(allocator.plan_allocation("NOPE").is_err());
        assert!(!allocator.is_reserved_by_other("NOPE", "story_x"));
    }
}
