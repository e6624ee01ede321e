//! On-disk layout of the kanban store.
//!
//! # Responsibility
//! - Own the SQLite schema: one table per entity kind plus tombstones,
//!   story sequence counters, rehome links, the history ledger and stored
//!   weekly reviews.
//! - Hand out connections that are migrated and tuned for unit commits.
//!
//! # Invariants
//! - Nothing reads or writes kanban rows before every migration applied.
//! - The schema enforces what memory cannot recover from: history and
//!   review rows reject update and delete; counters never decrease.
//! - File connections commit with `synchronous=FULL`; a returned commit
//!   survives process termination.
//! - `PRAGMA user_version` is the applied migration version.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A migration script failed; nothing from its transaction was kept.
    Migration {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },
    /// The file was written by a newer build.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Migration {
                version,
                name,
                source,
            } => write!(f, "migration {version} ({name}) failed: {source}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "kanban store schema {db_version} was written by a newer build (this build reads up to {latest_supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
