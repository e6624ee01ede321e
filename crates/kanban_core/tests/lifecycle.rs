use kanban_core::{
    Board, Entity, EntityKind, HistoryKind, KanbanError, KanbanService, LifecycleState, NewStory,
    NewTask, ParentRef, Resolved, Story, Task, TaskId, TaskPatch,
};

fn seeded() -> (KanbanService, Board, Story, String) {
    let service = KanbanService::open_in_memory().unwrap();
    let board = service.create_board("Main", None).unwrap();
    let story = service.create_story(NewStory::new("ALPHA", "Alpha")).unwrap();
    let column = service.snapshot().store().columns_of_board(&board.id)[0]
        .id
        .clone();
    (service, board, story, column)
}

fn make_task(service: &KanbanService, story: &Story, column: &str, title: &str) -> Task {
    service
        .create_task(NewTask::new(story.id.clone(), column, title))
        .unwrap()
}

#[test]
fn archive_and_unarchive_record_history() {
    let (service, _board, story, column) = seeded();
    let task = make_task(&service, &story, &column, "Cycle");
    let key = task.id.to_string();

    let archived = service.archive(&key).unwrap();
    assert_eq!(archived.state(), LifecycleState::Archived);
    assert!(matches!(
        service.archive(&key),
        Err(KanbanError::InvalidTransition { from: "archived", .. })
    ));

    let restored = service.unarchive(&key).unwrap();
    assert_eq!(restored.state(), LifecycleState::Active);
    assert!(matches!(
        service.unarchive(&key),
        Err(KanbanError::InvalidTransition { from: "active", .. })
    ));

    let timeline = service.history(&key);
    assert_eq!(timeline.len(), 3);
    assert!(!timeline[1].is_unarchive());
    assert!(timeline[2].is_unarchive());
}

#[test]
fn archived_stories_stay_referenceable() {
    let (service, _board, story, column) = seeded();
    service.archive(&story.id).unwrap();
    let task = make_task(&service, &story, &column, "Still allowed");
    assert_eq!(task.id.to_string(), "ALPHA-001");
}

#[test]
fn delete_without_confirmation_changes_nothing() {
    let (service, _board, story, column) = seeded();
    let task = make_task(&service, &story, &column, "Keep");
    let key = task.id.to_string();
    let before = service.history(&key).len();

    let err = service.hard_delete(&key, false).unwrap_err();
    assert!(matches!(err, KanbanError::ConfirmationRequired(ref id) if *id == key));
    match service.get(&key).unwrap() {
        Resolved::Live(Entity::Task(live)) => assert_eq!(live.state, LifecycleState::Active),
        other => panic!("expected live task, got {other:?}"),
    }
    assert_eq!(service.history(&key).len(), before);
}

#[test]
fn deleting_a_task_tombstones_its_comments() {
    let (service, _board, story, column) = seeded();
    let task = make_task(&service, &story, &column, "Doomed");
    let comment = service.add_comment(&task.id, "sam", "bye").unwrap();
    let key = task.id.to_string();

    let tombstone = service.hard_delete(&key, true).unwrap();
    assert_eq!(tombstone.kind, EntityKind::Task);

    for id in [key.as_str(), comment.id.as_str()] {
        assert!(matches!(service.get(id).unwrap(), Resolved::Tombstone(_)));
        assert_eq!(service.history(id).last().unwrap().kind, HistoryKind::Deleted);
    }
    assert_eq!(service.history(&key).len(), 2);
    assert!(matches!(
        service.hard_delete(&key, true),
        Err(KanbanError::UnknownEntity(_))
    ));
    assert!(matches!(
        service.archive(&key),
        Err(KanbanError::InvalidTransition { from: "deleted", .. })
    ));
    assert!(matches!(
        service.archive("board_missing"),
        Err(KanbanError::UnknownEntity(_))
    ));
}

#[test]
fn containers_with_tasks_cannot_be_deleted() {
    let (service, board, story, column) = seeded();
    let task = make_task(&service, &story, &column, "Anchor");

    for id in [board.id.as_str(), column.as_str(), story.id.as_str()] {
        assert!(matches!(
            service.hard_delete(id, true),
            Err(KanbanError::IntegrityViolation { .. })
        ));
    }

    service.hard_delete(&task.id.to_string(), true).unwrap();
    service.hard_delete(&board.id, true).unwrap();
    let snapshot = service.snapshot();
    assert_eq!(snapshot.store().count(EntityKind::Column), 0);
    assert!(snapshot.store().tombstone(&column).is_some());
    assert!(service
        .list_by_parent(&ParentRef::BoardColumns(board.id.clone()), true)
        .is_empty());
    assert!(snapshot.store().validate_all().is_ok());
}

#[test]
fn rehome_mints_new_id_and_archives_the_old_task() {
    let (service, _board, alpha, column) = seeded();
    let beta = service.create_story(NewStory::new("BETA", "Beta")).unwrap();
    make_task(&service, &alpha, &column, "First");
    let original = make_task(&service, &alpha, &column, "Second");
    assert_eq!(original.id.to_string(), "ALPHA-002");
    service.add_comment(&original.id, "sam", "stays here").unwrap();

    let successor = service.rehome(&original.id, "beta").unwrap();
    assert_eq!(successor.id.to_string(), "BETA-001");
    assert_eq!(successor.story_id, beta.id);
    assert_eq!(successor.title, original.title);
    assert_eq!(successor.column_id, original.column_id);
    assert_eq!(successor.state, LifecycleState::Active);

    match service.get("ALPHA-002").unwrap() {
        Resolved::Live(Entity::Task(old)) => {
            assert_eq!(old.state, LifecycleState::Archived);
            assert_eq!(old.title, original.title);
            assert_eq!(old.story_id, alpha.id);
        }
        other => panic!("expected archived task, got {other:?}"),
    }
    assert_eq!(service.resolve_rehomed(&original.id), successor.id);
    assert_eq!(service.snapshot().store().comments_of_task(&original.id).len(), 1);

    let old_history = service.history("ALPHA-002");
    let rehomed = old_history.last().unwrap();
    assert_eq!(rehomed.kind, HistoryKind::Rehomed);
    assert_eq!(rehomed.payload.get("new_task_id").map(String::as_str), Some("BETA-001"));
    let new_history = service.history("BETA-001");
    assert_eq!(new_history.len(), 1);
    assert_eq!(new_history[0].kind, HistoryKind::Created);
    assert_eq!(new_history[0].payload.get("origin").map(String::as_str), Some("ALPHA-002"));
}

#[test]
fn rehome_rejects_invalid_targets() {
    let (service, _board, alpha, column) = seeded();
    let task = make_task(&service, &alpha, &column, "Stay");

    assert!(matches!(
        service.rehome(&task.id, "ALPHA"),
        Err(KanbanError::Validation(_))
    ));
    assert!(matches!(
        service.rehome(&task.id, "NOPE"),
        Err(KanbanError::UnknownStory(_))
    ));
    let missing = TaskId::parse("ALPHA-099").unwrap();
    service.create_story(NewStory::new("BETA", "Beta")).unwrap();
    assert!(matches!(
        service.rehome(&missing, "BETA"),
        Err(KanbanError::UnknownEntity(_))
    ));

    service.archive(&task.id.to_string()).unwrap();
    assert!(matches!(
        service.rehome(&task.id, "BETA"),
        Err(KanbanError::InvalidTransition { from: "archived", .. })
    ));
}

#[test]
fn dangling_ids_in_history_resolve_to_tombstones() {
    let (service, _board, story, column) = seeded();
    let task = make_task(&service, &story, &column, "Ghost");
    let key = task.id.to_string();
    service.hard_delete(&key, true).unwrap();
    service.hard_delete(&story.id, true).unwrap();

    let story_history = service.history(&story.id);
    assert_eq!(story_history.first().unwrap().kind, HistoryKind::Created);
    let task_created = &service.history(&key)[0];
    let referenced_story = task_created.payload.get("story_id").unwrap();
    assert!(service.get(referenced_story).unwrap().is_deleted());
    assert_eq!(
        service.snapshot().store().story_of_task(&task.id),
        Some(story.id.clone())
    );
}

#[test]
fn superseded_tasks_are_frozen() {
    let (service, _board, alpha, column) = seeded();
    let beta = service.create_story(NewStory::new("BETA", "Beta")).unwrap();
    service.create_story(NewStory::new("GAMMA", "Gamma")).unwrap();
    let original = make_task(&service, &alpha, &column, "Frozen");
    let other_column = service.snapshot().store().columns_of_board(&original.board_id)[1]
        .id
        .clone();
    let successor = service.rehome(&original.id, "BETA").unwrap();
    assert_eq!(successor.story_id, beta.id);
    let key = original.id.to_string();
    let history_len = service.history(&key).len();

    let patch = TaskPatch {
        title: Some("Changed".to_string()),
        ..TaskPatch::default()
    };
    assert!(matches!(
        service.update_task(&original.id, patch),
        Err(KanbanError::InvalidTransition { from: "rehomed", action: "update", .. })
    ));
    assert!(matches!(
        service.move_task(&original.id, &other_column),
        Err(KanbanError::InvalidTransition { from: "rehomed", action: "move", .. })
    ));
    assert!(matches!(
        service.unarchive(&key),
        Err(KanbanError::InvalidTransition { from: "rehomed", .. })
    ));
    let second = service.rehome(&original.id, "GAMMA").unwrap_err();
    assert!(second.is_recoverable());
    assert!(matches!(
        second,
        KanbanError::InvalidTransition { from: "rehomed", .. }
    ));

    match service.get(&key).unwrap() {
        Resolved::Live(Entity::Task(old)) => {
            assert_eq!(old.title, "Frozen");
            assert_eq!(old.column_id, column);
            assert_eq!(old.state, LifecycleState::Archived);
        }
        other => panic!("expected archived task, got {other:?}"),
    }
    assert_eq!(service.history(&key).len(), history_len);
    assert_eq!(service.resolve_rehomed(&original.id), successor.id);
}
