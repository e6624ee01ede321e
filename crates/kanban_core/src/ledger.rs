//! Append-only history ledger.
//!
//! # Responsibility
//! - Keep every [`HistoryEntry`] in insertion order.
//! - Serve per-entity timelines and time-ordered range scans.
//!
//! # Invariants
//! - Entries are never mutated or removed; `seq` strictly increases.
//! - Range scans are ordered by `(timestamp, seq)`, so ties keep insertion
//!   order.
//! - Entry ids are unique; import merges rely on that to union ledgers.

use crate::clock::DateRange;
use crate::model::entity::EntityKind;
use crate::model::history::{HistoryEntry, HistoryKind};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Selection applied by [`HistoryLedger::query_range`]. Empty lists match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub entity_kinds: Vec<EntityKind>,
    pub entry_kinds: Vec<HistoryKind>,
    pub entity_ids: Vec<String>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        (self.entity_kinds.is_empty() || self.entity_kinds.contains(&entry.entity_kind))
            && (self.entry_kinds.is_empty() || self.entry_kinds.contains(&entry.kind))
            && (self.entity_ids.is_empty() || self.entity_ids.contains(&entry.entity_id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryLedger {
    entries: Vec<HistoryEntry>,
    by_entity: HashMap<String, Vec<usize>>,
    by_time: BTreeMap<(i64, u64), usize>,
    ids: HashSet<String>,
}

impl HistoryLedger {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn contains_id(&self, entry_id: &str) -> bool {
        self.ids.contains(entry_id)
    }

    /// Sequence number the next appended entry receives.
    pub fn next_seq(&self) -> u64 {
        self.entries.last().map_or(1, |entry| entry.seq + 1)
    }

    /// Latest timestamp recorded so far.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.by_time.keys().next_back().map(|(timestamp, _)| *timestamp)
    }

    /// Timeline of one entity ordered by `(timestamp, seq)`.
    ///
    /// Locally recorded entries are already in that order; merged imports
    /// may interleave older entries.
    pub fn query(&self, entity_id: &str) -> Vec<&HistoryEntry> {
        let mut timeline: Vec<&HistoryEntry> = self
            .by_entity
            .get(entity_id)
            .into_iter()
            .flatten()
            .map(|index| &self.entries[*index])
            .collect();
        timeline.sort_by_key(|entry| (entry.timestamp, entry.seq));
        timeline
    }

    pub fn history_len(&self, entity_id: &str) -> usize {
        self.by_entity.get(entity_id).map_or(0, Vec::len)
    }

    /// Lazily scans entries with `timestamp` in `range` across all entities.
    ///
    /// The iterator borrows the ledger; calling again restarts the scan.
    pub fn query_range<'a>(
        &'a self,
        range: DateRange,
        filter: &'a HistoryFilter,
    ) -> impl Iterator<Item = &'a HistoryEntry> + 'a {
        // Fields are public; an inverted range scans nothing.
        let end_ms = range.end_ms.max(range.start_ms);
        let bounds = (range.start_ms, 0)..(end_ms, 0);
        self.by_time
            .range(bounds)
            .map(|(_, index)| &self.entries[*index])
            .filter(move |entry| filter.matches(entry))
    }

    /// Appends an entry whose `seq` was assigned from [`Self::next_seq`].
    pub(crate) fn append(&mut self, entry: HistoryEntry) {
        let index = self.entries.len();
        self.by_entity
            .entry(entry.entity_id.clone())
            .or_default()
            .push(index);
        self.by_time.insert((entry.timestamp, entry.seq), index);
        self.ids.insert(entry.id.clone());
        self.entries.push(entry);
    }
}
