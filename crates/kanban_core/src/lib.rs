//! Core data-integrity engine for the Kanban tool.
//! This crate is the single source of truth for identity, history and
//! referential invariants; UI and summary plugins only consume its results.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod evidence;
pub mod extension;
pub mod ledger;
pub mod logging;
pub mod model;
mod repo;
pub mod search;
pub mod service;
pub mod state;
pub mod store;
pub mod transfer;
pub mod worker;

pub use clock::{Clock, DateRange, ManualClock, SystemClock};
pub use config::{EngineConfig, Storage};
pub use db::DbError;
pub use error::{KanbanError, KanbanResult};
pub use evidence::bundle::{EvidenceBundle, EvidenceQuery};
pub use extension::default_plugin::DefaultSummaryPlugin;
pub use extension::manifest::{ManifestError, PluginEntrypoints, PluginManifest};
pub use extension::plugin::{PluginError, SummaryDocument, SummaryPlugin};
pub use extension::registry::{PluginRegistry, RegistryError};
pub use ledger::{HistoryFilter, HistoryLedger};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::board::{Board, BoardPatch, BoardSettings, Column};
pub use model::comment::Comment;
pub use model::entity::{Entity, EntityKind, LifecycleState, Resolved, Tombstone};
pub use model::history::{HistoryEntry, HistoryKind, HistoryPayload};
pub use model::ids::{BoardId, ColumnId, CommentId, StoryId, TaskId};
pub use model::review::WeeklyReview;
pub use model::story::{NewStory, Story, StoryPatch};
pub use model::task::{NewTask, RehomeLink, Task, TaskPatch, TaskView};
pub use repo::RepoError;
pub use search::{SearchFilters, SearchHit};
pub use service::KanbanService;
pub use state::State;
pub use store::allocator::{IdentityAllocator, SequenceCounter};
pub use store::{IntegrityStore, ParentRef};
pub use transfer::document::{DocumentHeader, ExportDocument, SUPPORTED_SCHEMA_VERSION};
pub use transfer::import::{
    ConflictReport, ConflictResolution, ImportOptions, ImportReport,
};
pub use worker::{BackgroundWorker, CancellationToken, JobHandle};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
