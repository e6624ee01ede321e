use kanban_core::db::migrations::{current_user_version, latest_version};
use kanban_core::db::{open_db, open_db_in_memory};
use kanban_core::{DbError, EngineConfig, KanbanError, KanbanService, RepoError};

#[test]
fn fresh_database_is_at_latest_version() {
    let conn = open_db_in_memory().unwrap();
    assert_eq!(current_user_version(&conn).unwrap(), latest_version());
}

#[test]
fn reopening_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kanban.sqlite3");
    drop(open_db(&path).unwrap());
    let conn = open_db(&path).unwrap();
    assert_eq!(current_user_version(&conn).unwrap(), latest_version());
}

#[test]
fn history_rows_reject_update_and_delete() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO history (seq, id, entity_kind, entity_id, timestamp, kind, payload)
         VALUES (1, 'hist_1', 'board', 'board_1', 10, 'created', '{}');",
        [],
    )
    .unwrap();

    assert!(conn
        .execute("UPDATE history SET kind = 'moved' WHERE seq = 1;", [])
        .is_err());
    assert!(conn.execute("DELETE FROM history;", []).is_err());
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM history;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn sequence_counters_never_decrease() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO story_sequences (story_code, story_id, next_seq) VALUES ('ALPHA', 'story_1', 3);",
        [],
    )
    .unwrap();

    assert!(conn
        .execute(
            "UPDATE story_sequences SET next_seq = 2 WHERE story_code = 'ALPHA';",
            []
        )
        .is_err());
    conn.execute(
        "UPDATE story_sequences SET next_seq = 4 WHERE story_code = 'ALPHA';",
        [],
    )
    .unwrap();
}

#[test]
fn newer_database_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kanban.sqlite3");
    let conn = open_db(&path).unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version() + 1))
        .unwrap();
    drop(conn);

    match open_db(&path) {
        Err(DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        }) => {
            assert_eq!(db_version, latest_version() + 1);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("expected unsupported schema version, got {other:?}"),
    }

    match KanbanService::open(EngineConfig::file(&path)) {
        Err(KanbanError::Storage(RepoError::Db(DbError::UnsupportedSchemaVersion { .. }))) => {}
        Err(other) => panic!("expected storage error, got {other:?}"),
        Ok(_) => panic!("newer database must not open"),
    }
}

#[test]
fn review_rows_reject_update_and_delete() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO weekly_reviews (
            id, board_ids, story_ids, start_ms, end_ms, plugin_id, summary_markdown,
            metadata, evidence_entry_ids, evidence_comment_ids, created_at
         ) VALUES ('review_1', '[]', '[]', 0, 10, 'builtin', '# Weekly Summary', '{}', '[]', '[]', 10);",
        [],
    )
    .unwrap();

    assert!(conn
        .execute(
            "UPDATE weekly_reviews SET summary_markdown = 'edited' WHERE id = 'review_1';",
            []
        )
        .is_err());
    assert!(conn.execute("DELETE FROM weekly_reviews;", []).is_err());
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM weekly_reviews;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}
