//! Engine facade consumed by UI callers.
//!
//! # Responsibility
//! - Serialize every mutation behind one writer lock and run it as one
//!   atomic unit: plan against a snapshot, commit to SQLite, apply.
//! - Publish point-in-time snapshots for readers and background jobs.
//!
//! # Invariants
//! - Published state changes only after its unit was committed.
//! - A failed plan or commit leaves both disk and memory untouched.
//! - Unit timestamps never decrease across the lifetime of the database.

mod entities;
mod lifecycle;
mod reviews;
mod transfer;

use crate::clock::{Clock, DateRange};
use crate::config::{EngineConfig, Storage};
use crate::error::{KanbanError, KanbanResult};
use crate::evidence::build_bundle;
use crate::evidence::bundle::{EvidenceBundle, EvidenceQuery};
use crate::extension::plugin::{PluginError, SummaryDocument};
use crate::extension::registry::PluginRegistry;
use crate::ledger::HistoryFilter;
use crate::logging::log_outcome;
use crate::model::entity::{Entity, Resolved};
use crate::model::history::HistoryEntry;
use crate::model::ids::TaskId;
use crate::model::task::TaskView;
use crate::repo::state_repo::{SqliteStateRepository, StateRepository};
use crate::search::{self, SearchFilters, SearchHit};
use crate::state::{State, Unit, UnitBuilder};
use crate::store::ParentRef;
use crate::worker::{BackgroundWorker, BatchGuard, JobHandle};
use log::info;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

const WORKER_THREAD_NAME: &str = "kanban-core-worker";

/// Shared engine state; background jobs hold it through an `Arc`.
pub(crate) struct Engine {
    writer: Mutex<SqliteStateRepository>,
    published: RwLock<Arc<State>>,
    clock: Arc<dyn Clock>,
    last_timestamp: AtomicI64,
    batch_size: usize,
}

impl Engine {
    fn snapshot(&self) -> Arc<State> {
        Arc::clone(&self.published.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_writer(&self) -> MutexGuard<'_, SqliteStateRepository> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unit timestamp: wall clock, floored at the last committed time.
    fn next_timestamp(&self) -> i64 {
        self.clock
            .now_ms()
            .max(self.last_timestamp.load(Ordering::SeqCst))
    }

    /// Runs `plan` as one atomic unit under the writer lock.
    fn mutate<T>(
        &self,
        plan: impl FnOnce(&State, &mut UnitBuilder) -> KanbanResult<T>,
    ) -> KanbanResult<T> {
        let repo = self.lock_writer();
        let (value, unit) = {
            let snapshot = self.snapshot();
            let mut builder = UnitBuilder::new(self.next_timestamp(), snapshot.ledger().next_seq());
            let value = plan(&snapshot, &mut builder)?;
            (value, builder.finish())
        };
        self.publish(&repo, &unit)?;
        Ok(value)
    }

    /// Commits `unit` and applies it to the published state.
    ///
    /// The caller holds the writer lock.
    fn publish(&self, repo: &SqliteStateRepository, unit: &Unit) -> KanbanResult<()> {
        if unit.is_empty() {
            return Ok(());
        }
        repo.commit(unit)?;
        if let Some(latest) = unit.history.iter().map(|entry| entry.timestamp).max() {
            self.last_timestamp.fetch_max(latest, Ordering::SeqCst);
        }
        let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut published).apply(unit);
        Ok(())
    }
}

/// Entry point of the core: one per database.
pub struct KanbanService {
    engine: Arc<Engine>,
    worker: BackgroundWorker,
}

impl KanbanService {
    /// Opens (and migrates) the configured store and loads it into memory.
    pub fn open(config: EngineConfig) -> KanbanResult<Self> {
        let started_at = Instant::now();
        let result = Self::open_inner(&config);
        log_outcome("engine_open", storage_label(&config), started_at, &result);
        result
    }

    /// Private in-memory engine with default settings.
    pub fn open_in_memory() -> KanbanResult<Self> {
        Self::open(EngineConfig::in_memory())
    }

    fn open_inner(config: &EngineConfig) -> KanbanResult<Self> {
        let repo = SqliteStateRepository::open(config)?;
        let state = repo.load_state()?;
        let last_timestamp = state.ledger().last_timestamp().unwrap_or(i64::MIN);
        info!(
            "event=state_load module=service status=ok boards={} stories={} tasks={} history={}",
            state.store().boards().count(),
            state.store().stories().count(),
            state.store().tasks().count(),
            state.ledger().len()
        );
        let engine = Engine {
            writer: Mutex::new(repo),
            published: RwLock::new(Arc::new(state)),
            clock: Arc::clone(&config.clock),
            last_timestamp: AtomicI64::new(last_timestamp),
            batch_size: config.import_batch_size.max(1),
        };
        Ok(Self {
            engine: Arc::new(engine),
            worker: BackgroundWorker::spawn(WORKER_THREAD_NAME)?,
        })
    }

    /// Point-in-time view. Never waits on disk I/O.
    pub fn snapshot(&self) -> Arc<State> {
        self.engine.snapshot()
    }

    /// Stops the background worker after queued jobs finish.
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }

    fn run<T>(
        &self,
        op: &'static str,
        subject: &str,
        plan: impl FnOnce(&State, &mut UnitBuilder) -> KanbanResult<T>,
    ) -> KanbanResult<T> {
        let started_at = Instant::now();
        let result = self.engine.mutate(plan);
        log_outcome(op, subject, started_at, &result);
        result
    }

    /// Resolves an id to its live record or tombstone.
    pub fn get(&self, id: &str) -> KanbanResult<Resolved> {
        self.snapshot()
            .store()
            .get(id)
            .ok_or_else(|| KanbanError::UnknownEntity(id.to_string()))
    }

    pub fn list_by_parent(&self, parent: &ParentRef, include_archived: bool) -> Vec<Entity> {
        self.snapshot().store().list_by_parent(parent, include_archived)
    }

    /// Task joined with its story's code, title and color.
    pub fn task_view(&self, task_id: &TaskId) -> KanbanResult<TaskView> {
        self.snapshot()
            .store()
            .task_view(task_id)
            .ok_or_else(|| KanbanError::UnknownEntity(task_id.to_string()))
    }

    /// Ledger segment of one entity, deleted entities included.
    pub fn history(&self, entity_id: &str) -> Vec<HistoryEntry> {
        self.snapshot()
            .ledger()
            .query(entity_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Entries across all entities in `range`, ordered by time.
    pub fn history_range(&self, range: DateRange, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        self.snapshot()
            .ledger()
            .query_range(range, filter)
            .cloned()
            .collect()
    }

    pub fn resolve_rehomed(&self, task_id: &TaskId) -> TaskId {
        self.snapshot().store().resolve_rehomed(task_id)
    }

    pub fn search(&self, text: &str, filters: &SearchFilters) -> KanbanResult<Vec<SearchHit>> {
        let started_at = Instant::now();
        let result = search::search(self.snapshot().store(), text, filters);
        log_outcome("search", "store", started_at, &result);
        result
    }

    /// Builds the evidence bundle for `query` on the calling thread.
    pub fn build_evidence(&self, query: &EvidenceQuery) -> KanbanResult<EvidenceBundle> {
        let started_at = Instant::now();
        let result = build_bundle(&self.snapshot(), query, &mut BatchGuard::foreground());
        log_evidence(&result);
        log_outcome("evidence_build", "ledger", started_at, &result);
        result
    }

    /// Builds the evidence bundle on the background worker.
    pub fn build_evidence_in_background(
        &self,
        query: EvidenceQuery,
    ) -> KanbanResult<JobHandle<EvidenceBundle>> {
        let engine = Arc::clone(&self.engine);
        self.worker.submit(move |token| {
            let started_at = Instant::now();
            let snapshot = engine.snapshot();
            let mut batches = BatchGuard::new(Some(token), engine.batch_size);
            let result = build_bundle(&snapshot, &query, &mut batches);
            log_evidence(&result);
            log_outcome("evidence_build_background", "ledger", started_at, &result);
            result
        })
    }

    /// Builds evidence for `query` and renders it with the active plugin.
    ///
    /// Plugin failures are returned unchanged. Use `record_review` to keep
    /// the rendered summary.
    pub fn summarize(
        &self,
        registry: &PluginRegistry,
        query: &EvidenceQuery,
    ) -> KanbanResult<Result<SummaryDocument, PluginError>> {
        let bundle = self.build_evidence(query)?;
        Ok(registry.summarize_active(&bundle))
    }
}

fn log_evidence(result: &KanbanResult<EvidenceBundle>) {
    if let Ok(bundle) = result {
        info!(
            "event=evidence_bundle module=evidence status=ok comments={} history_entries={} touched_tasks={}",
            bundle.comments.len(),
            bundle.history_entries.len(),
            bundle.touched_task_ids.len()
        );
    }
}

fn storage_label(config: &EngineConfig) -> &'static str {
    match config.storage {
        Storage::File(_) => "file",
        Storage::InMemory => "memory",
    }
}
