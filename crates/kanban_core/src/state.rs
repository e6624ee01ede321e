//! Published engine state and atomic units of change.
//!
//! # Responsibility
//! - Bundle the integrity store and the history ledger into one snapshot.
//! - Describe one atomic unit: entity writes plus their history entries.
//!
//! # Invariants
//! - A [`Unit`] is planned against a snapshot, committed to SQLite, and only
//!   then applied; `apply` cannot fail.
//! - `version` increases by one per applied unit.

use crate::ledger::HistoryLedger;
use crate::model::entity::{Entity, EntityKind, Tombstone};
use crate::model::history::{HistoryEntry, HistoryKind, HistoryPayload};
use crate::model::ids::{new_opaque_id, HISTORY_ID_PREFIX};
use crate::model::review::WeeklyReview;
use crate::model::task::RehomeLink;
use crate::store::allocator::SequenceCounter;
use crate::store::IntegrityStore;

/// Point-in-time view of every entity and history entry.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub(crate) store: IntegrityStore,
    pub(crate) ledger: HistoryLedger,
    pub(crate) version: u64,
}

impl State {
    pub fn store(&self) -> &IntegrityStore {
        &self.store
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// Number of units applied since the state was loaded.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn apply(&mut self, unit: &Unit) {
        for write in &unit.writes {
            match write {
                Write::Put(entity) => self.store.put(entity.clone()),
                Write::Tombstone(tombstone) => self.store.put_tombstone(tombstone.clone()),
                Write::Counter(counter) => self.store.put_counter(counter.clone()),
                Write::DropCounter(story_code) => self.store.drop_unissued_counter(story_code),
                Write::RehomeLink(link) => self.store.put_rehome_link(link.clone()),
                Write::Review(review) => self.store.put_review(review.clone()),
            }
        }
        for entry in &unit.history {
            self.ledger.append(entry.clone());
        }
        self.version += 1;
    }
}

/// One persisted change inside a unit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Write {
    Put(Entity),
    /// Removes the live record and stores its tombstone.
    Tombstone(Tombstone),
    Counter(SequenceCounter),
    /// Removes a counter that never issued a number.
    DropCounter(String),
    RehomeLink(RehomeLink),
    /// Insert-only; reviews are never rewritten.
    Review(WeeklyReview),
}

/// Atomic unit: committed or rolled back as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Unit {
    pub(crate) writes: Vec<Write>,
    pub(crate) history: Vec<HistoryEntry>,
}

impl Unit {
    pub(crate) fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.history.is_empty()
    }
}

/// Accumulates writes and history for one unit, stamping every entry with
/// the unit timestamp and consecutive `seq` values.
#[derive(Debug)]
pub(crate) struct UnitBuilder {
    timestamp: i64,
    next_seq: u64,
    unit: Unit,
}

impl UnitBuilder {
    pub(crate) fn new(timestamp: i64, next_seq: u64) -> Self {
        Self {
            timestamp,
            next_seq,
            unit: Unit::default(),
        }
    }

    pub(crate) fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub(crate) fn put(&mut self, entity: Entity) {
        self.unit.writes.push(Write::Put(entity));
    }

    pub(crate) fn tombstone(&mut self, kind: EntityKind, id: impl Into<String>) {
        self.unit.writes.push(Write::Tombstone(Tombstone {
            kind,
            id: id.into(),
            deleted_at: self.timestamp,
        }));
    }

    /// Keeps an incoming tombstone with its original deletion time.
    pub(crate) fn put_tombstone(&mut self, tombstone: Tombstone) {
        self.unit.writes.push(Write::Tombstone(tombstone));
    }

    pub(crate) fn counter(&mut self, counter: SequenceCounter) {
        self.unit.writes.push(Write::Counter(counter));
    }

    pub(crate) fn drop_counter(&mut self, story_code: impl Into<String>) {
        self.unit.writes.push(Write::DropCounter(story_code.into()));
    }

    pub(crate) fn rehome_link(&mut self, link: RehomeLink) {
        self.unit.writes.push(Write::RehomeLink(link));
    }

    pub(crate) fn review(&mut self, review: WeeklyReview) {
        self.unit.writes.push(Write::Review(review));
    }

    /// Records a new history entry about `entity_id`.
    pub(crate) fn record(
        &mut self,
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        kind: HistoryKind,
        payload: HistoryPayload,
    ) -> &HistoryEntry {
        let entry = HistoryEntry {
            id: new_opaque_id(HISTORY_ID_PREFIX),
            seq: self.next_seq,
            entity_kind,
            entity_id: entity_id.into(),
            timestamp: self.timestamp,
            kind,
            payload,
        };
        self.push_entry(entry)
    }

    /// Appends an entry from another ledger, keeping its id and timestamp.
    pub(crate) fn record_imported(&mut self, mut entry: HistoryEntry) {
        entry.seq = self.next_seq;
        self.push_entry(entry);
    }

    pub(crate) fn finish(self) -> Unit {
        self.unit
    }

    fn push_entry(&mut self, entry: HistoryEntry) -> &HistoryEntry {
        self.next_seq += 1;
        let index = self.unit.history.len();
        self.unit.history.push(entry);
        &self.unit.history[index]
    }
}

#[cfg(test)]
mod tests {
    use super::{State, UnitBuilder};
    use crate::model::board::{Board, BoardSettings};
    use crate::model::entity::{Entity, EntityKind, LifecycleState};
    use crate::model::history::{HistoryKind, HistoryPayload};

    #[test]
    fn applied_unit_updates_store_ledger_and_version() {
        let mut state = State::default();
        let mut builder = UnitBuilder::new(100, state.ledger().next_seq());
        builder.put(Entity::Board(Board {
            id: "board_1".to_string(),
            name: "Main".to_string(),
            settings: BoardSettings::default(),
            state: LifecycleState::Active,
            created_at: builder.timestamp(),
        }));
        builder.record(
            EntityKind::Board,
            "board_1",
            HistoryKind::Created,
            HistoryPayload::new(),
        );
        builder.record(
            EntityKind::Board,
            "board_1",
            HistoryKind::Updated,
            HistoryPayload::new(),
        );
        let unit = builder.finish();
        state.apply(&unit);

        assert!(state.store().board("board_1").is_some());
        let seqs: Vec<u64> = state.ledger().entries().map(|entry| entry.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(state.version(), 1);
    }
}
