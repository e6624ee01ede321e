//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `kanban_core` linkage with deterministic output.
//! - Optionally open a database file and print live entity counts.

use kanban_core::{EngineConfig, EntityKind, KanbanService};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("kanban_core ping={}", kanban_core::ping());
    println!("kanban_core version={}", kanban_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    let service = match KanbanService::open(EngineConfig::file(&db_path)) {
        Ok(service) => service,
        Err(err) => {
            eprintln!("cannot open {db_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let snapshot = service.snapshot();
    let store = snapshot.store();
    for kind in [
        EntityKind::Board,
        EntityKind::Column,
        EntityKind::Story,
        EntityKind::Task,
        EntityKind::Comment,
    ] {
        println!("{}={}", kind.as_str(), store.count(kind));
    }
    println!("tombstones={}", store.tombstones().count());
    println!("history={}", snapshot.ledger().len());
    ExitCode::SUCCESS
}
