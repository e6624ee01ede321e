//! Ordered schema scripts for the kanban store.
//!
//! # Responsibility
//! - List every schema step: base tables, ledger and counter guards, weekly
//!   reviews.
//! - Bring a connection from its recorded version to [`latest_version`] in
//!   one transaction.
//!
//! # Invariants
//! - Versions are consecutive from 1 and scripts are never edited once
//!   released; new behavior ships as a new script.
//! - A failed script rolls back every pending step, `user_version` included.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "entity_tables",
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        name: "history_guards",
        sql: include_str!("0002_history_guards.sql"),
    },
    Migration {
        version: 3,
        name: "weekly_reviews",
        sql: include_str!("0003_weekly_reviews.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Runs every script newer than the recorded version.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file is ahead of this build; the
///   file is left untouched.
/// - `Migration` naming the first script that failed.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let recorded = current_user_version(conn)?;
    let latest = latest_version();
    if recorded > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: recorded,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > recorded)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        tx.execute_batch(migration.sql)
            .and_then(|()| {
                tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
            })
            .map_err(|source| DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            })?;
    }
    tx.commit()?;
    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={} steps={}",
        recorded,
        latest,
        pending.len()
    );
    Ok(())
}

/// Schema version recorded in the file.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
