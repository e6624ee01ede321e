use kanban_core::{
    Board, DateRange, EngineConfig, EntityKind, HistoryFilter, HistoryKind, HistoryPayload,
    KanbanError, KanbanService, ManualClock, NewStory, NewTask, Story, TaskPatch,
};
use std::sync::Arc;

fn seeded(clock: Arc<ManualClock>) -> (KanbanService, Board, Story, String) {
    let service = KanbanService::open(EngineConfig::in_memory().with_clock(clock)).unwrap();
    let board = service.create_board("Main", None).unwrap();
    let story = service.create_story(NewStory::new("ALPHA", "Alpha")).unwrap();
    let column = service.snapshot().store().columns_of_board(&board.id)[0]
        .id
        .clone();
    (service, board, story, column)
}

#[test]
fn each_change_appends_exactly_one_entry() {
    let (service, _board, story, column) = seeded(Arc::new(ManualClock::new(1_000)));
    let task = service
        .create_task(NewTask::new(story.id.clone(), column, "Ledger"))
        .unwrap();
    let task_key = task.id.to_string();
    assert_eq!(service.history(&task_key).len(), 1);

    let patch = TaskPatch {
        priority: Some("high".to_string()),
        ..TaskPatch::default()
    };
    service.update_task(&task.id, patch.clone()).unwrap();
    service.update_task(&task.id, patch).unwrap();

    let timeline = service.history(&task_key);
    let kinds: Vec<HistoryKind> = timeline.iter().map(|entry| entry.kind).collect();
    assert_eq!(kinds, vec![HistoryKind::Created, HistoryKind::Updated]);
    assert_eq!(
        timeline[1].payload.get("old_priority").map(String::as_str),
        Some("")
    );
    assert_eq!(
        timeline[1].payload.get("new_priority").map(String::as_str),
        Some("high")
    );
}

#[test]
fn comment_edits_keep_prior_text() {
    let (service, _board, story, column) = seeded(Arc::new(ManualClock::new(1_000)));
    let task = service
        .create_task(NewTask::new(story.id.clone(), column, "Discuss"))
        .unwrap();
    let comment = service.add_comment(&task.id, "sam", "first draft").unwrap();

    let edited = service.edit_comment(&comment.id, "final text").unwrap();
    assert_eq!(edited.body, "final text");
    assert_eq!(edited.created_at, comment.created_at);

    let timeline = service.history(&comment.id);
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[1].kind, HistoryKind::CommentEdited);
    assert_eq!(
        timeline[1].payload.get("previous_body").map(String::as_str),
        Some("first draft")
    );

    service.edit_comment(&comment.id, "final text").unwrap();
    assert_eq!(service.history(&comment.id).len(), 2);
}

#[test]
fn append_requires_a_live_entity() {
    let (service, board, _story, _column) = seeded(Arc::new(ManualClock::new(1_000)));
    let mut note = HistoryPayload::new();
    note.insert("note".to_string(), "manual".to_string());

    let entry = service
        .append_history(&board.id, HistoryKind::Updated, note.clone())
        .unwrap();
    assert_eq!(entry.entity_kind, EntityKind::Board);
    assert_eq!(service.history(&board.id).last().unwrap().id, entry.id);

    assert!(matches!(
        service.append_history("board_missing", HistoryKind::Updated, note.clone()),
        Err(KanbanError::UnknownEntity(_))
    ));
    assert!(matches!(
        service.append_history(&board.id, HistoryKind::Deleted, note),
        Err(KanbanError::Validation(_))
    ));
}

#[test]
fn range_queries_cross_entities_in_time_order() {
    let clock = Arc::new(ManualClock::new(1_000));
    let (service, board, story, column) = seeded(clock.clone());
    clock.set(2_000);
    let task = service
        .create_task(NewTask::new(story.id.clone(), column, "Timed"))
        .unwrap();
    clock.set(3_000);
    service.add_comment(&task.id, "sam", "note").unwrap();

    let all = service.history_range(DateRange::new(0, 10_000).unwrap(), &HistoryFilter::default());
    assert!(all
        .windows(2)
        .all(|pair| (pair[0].timestamp, pair[0].seq) <= (pair[1].timestamp, pair[1].seq)));
    assert_eq!(all.first().unwrap().entity_id, board.id);

    let window = service.history_range(DateRange::new(2_000, 3_000).unwrap(), &HistoryFilter::default());
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].entity_id, task.id.to_string());

    let only_comments = HistoryFilter {
        entity_kinds: vec![EntityKind::Comment],
        ..HistoryFilter::default()
    };
    let comments = service.history_range(DateRange::unbounded(), &only_comments);
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].timestamp, 3_000);
}

#[test]
fn timestamps_never_go_backwards_when_the_clock_does() {
    let clock = Arc::new(ManualClock::new(10_000));
    let (service, _board, story, column) = seeded(clock.clone());
    clock.set(500);
    let task = service
        .create_task(NewTask::new(story.id.clone(), column, "Skew"))
        .unwrap();
    assert_eq!(task.created_at, 10_000);
    let timeline = service.history(&task.id.to_string());
    assert_eq!(timeline[0].timestamp, 10_000);
}
