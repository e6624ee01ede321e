use kanban_core::{
    DateRange, EngineConfig, EvidenceQuery, HistoryKind, KanbanService, ManualClock, NewStory,
    NewTask, PluginRegistry, Story, Task,
};
use std::sync::Arc;
use std::time::Duration;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const WEEK_ONE: i64 = 2_800 * DAY_MS;
const WEEK_TWO: i64 = WEEK_ONE + 7 * DAY_MS;

struct Fixture {
    service: KanbanService,
    clock: Arc<ManualClock>,
    story: Story,
    task: Task,
    done_column: String,
}

/// One task created in week one, finished in week two.
fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(WEEK_ONE + 1_000));
    let service =
        KanbanService::open(EngineConfig::in_memory().with_clock(clock.clone())).unwrap();
    let board = service.create_board("Main", None).unwrap();
    let columns: Vec<String> = service
        .snapshot()
        .store()
        .columns_of_board(&board.id)
        .iter()
        .map(|column| column.id.clone())
        .collect();
    let story = service.create_story(NewStory::new("ALPHA", "Alpha")).unwrap();
    let task = service
        .create_task(NewTask::new(story.id.clone(), columns[0].clone(), "Ship it"))
        .unwrap();
    service.add_comment(&task.id, "sam", "started").unwrap();
    Fixture {
        service,
        clock,
        story,
        task,
        done_column: columns[2].clone(),
    }
}

fn finish_in_week_two(fixture: &Fixture) {
    fixture.clock.set(WEEK_TWO + 5_000);
    fixture
        .service
        .move_task(&fixture.task.id, &fixture.done_column)
        .unwrap();
    fixture
        .service
        .add_comment(&fixture.task.id, "sam", "was blocked on review, now done")
        .unwrap();
}

#[test]
fn quiet_week_yields_empty_bundle_and_fixed_summary() {
    let fixture = fixture();
    let query = EvidenceQuery::new(DateRange::week_starting(WEEK_ONE - 7 * DAY_MS));

    let bundle = fixture.service.build_evidence(&query).unwrap();
    assert!(bundle.is_empty());
    assert!(bundle.touched_task_ids.is_empty());

    let registry = PluginRegistry::with_builtin();
    let summary = fixture.service.summarize(&registry, &query).unwrap().unwrap();
    assert!(summary.markdown.contains("No material changes"));
}

#[test]
fn weeks_are_windowed_by_timestamp() {
    let fixture = fixture();
    finish_in_week_two(&fixture);

    let first = fixture
        .service
        .build_evidence(&EvidenceQuery::new(DateRange::week_starting(WEEK_ONE)))
        .unwrap();
    assert_eq!(first.comments.len(), 1);
    assert!(first
        .history_entries
        .iter()
        .all(|entry| entry.kind == HistoryKind::Created));
    assert_eq!(first.touched_task_ids, vec![fixture.task.id.clone()]);

    let second = fixture
        .service
        .build_evidence(&EvidenceQuery::new(DateRange::week_starting(WEEK_TWO)))
        .unwrap();
    let kinds: Vec<HistoryKind> = second.history_entries.iter().map(|entry| entry.kind).collect();
    assert_eq!(kinds, vec![HistoryKind::Moved, HistoryKind::Created]);
    assert_eq!(second.comments.len(), 1);
    assert!(second.comments[0].body.contains("blocked"));
}

#[test]
fn board_and_story_filters_narrow_the_bundle() {
    let fixture = fixture();
    let service = &fixture.service;
    let other_board = service
        .create_board("Side", Some(vec!["Queue".to_string()]))
        .unwrap();
    let queue = service.snapshot().store().columns_of_board(&other_board.id)[0]
        .id
        .clone();
    let beta = service.create_story(NewStory::new("BETA", "Beta")).unwrap();
    let side_task = service
        .create_task(NewTask::new(beta.id.clone(), queue, "Side work"))
        .unwrap();

    let week = DateRange::week_starting(WEEK_ONE);
    let by_board = service
        .build_evidence(&EvidenceQuery::new(week).with_boards(vec![other_board.id.clone()]))
        .unwrap();
    assert_eq!(by_board.touched_task_ids, vec![side_task.id.clone()]);
    assert!(by_board.comments.is_empty());

    let by_story = service
        .build_evidence(&EvidenceQuery::new(week).with_stories(vec![fixture.story.id.clone()]))
        .unwrap();
    assert_eq!(by_story.touched_task_ids, vec![fixture.task.id.clone()]);
    assert_eq!(by_story.comments.len(), 1);
    assert!(by_story
        .history_entries
        .iter()
        .all(|entry| entry.entity_id != side_task.id.to_string()));
}

#[test]
fn deleted_tasks_stay_in_scope() {
    let fixture = fixture();
    let board_id = fixture.task.board_id.clone();
    let key = fixture.task.id.to_string();
    fixture.service.hard_delete(&key, true).unwrap();

    let bundle = fixture
        .service
        .build_evidence(
            &EvidenceQuery::new(DateRange::week_starting(WEEK_ONE))
                .with_boards(vec![board_id])
                .with_stories(vec![fixture.story.id.clone()]),
        )
        .unwrap();
    let task_kinds: Vec<HistoryKind> = bundle
        .history_entries
        .iter()
        .filter(|entry| entry.entity_id == key)
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(task_kinds, vec![HistoryKind::Created, HistoryKind::Deleted]);
    assert_eq!(bundle.touched_task_ids, vec![fixture.task.id.clone()]);
    assert!(bundle.comments.is_empty());
}

#[test]
fn background_build_matches_foreground() {
    let fixture = fixture();
    let query = EvidenceQuery::new(DateRange::week_starting(WEEK_ONE));
    let foreground = fixture.service.build_evidence(&query).unwrap();
    let background = fixture
        .service
        .build_evidence_in_background(query)
        .unwrap()
        .wait(Duration::from_secs(10))
        .expect("bundle finished")
        .unwrap();
    assert_eq!(background, foreground);
}

#[test]
fn builtin_plugin_summarizes_a_finished_week() {
    let fixture = fixture();
    finish_in_week_two(&fixture);
    let registry = PluginRegistry::with_builtin();

    let summary = fixture
        .service
        .summarize(&registry, &EvidenceQuery::new(DateRange::week_starting(WEEK_TWO)))
        .unwrap()
        .unwrap();
    assert!(summary.markdown.contains("## Completed Tasks\n- ALPHA-001"));
    assert!(summary.markdown.contains("## Blockers / Risks"));
    assert!(summary.markdown.contains("blocked on review"));

    let empty = PluginRegistry::new();
    let err = fixture
        .service
        .summarize(&empty, &EvidenceQuery::new(DateRange::week_starting(WEEK_TWO)))
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code, "plugin_not_selected");
}

#[test]
fn recorded_reviews_keep_the_rendered_week() {
    let fixture = fixture();
    finish_in_week_two(&fixture);
    let registry = PluginRegistry::with_builtin();
    let query = EvidenceQuery::new(DateRange::week_starting(WEEK_TWO));
    let bundle = fixture.service.build_evidence(&query).unwrap();

    let review = fixture
        .service
        .record_review(&registry, &query)
        .unwrap()
        .unwrap();
    assert!(review
        .summary_markdown
        .contains("## Completed Tasks\n- ALPHA-001"));
    assert_eq!(Some(review.plugin_id.as_str()), registry.active_plugin_id());
    assert_eq!(review.board_ids, vec![fixture.task.board_id.clone()]);
    assert_eq!(review.story_ids, vec![fixture.story.id.clone()]);
    let entry_ids: Vec<String> = bundle
        .history_entries
        .iter()
        .map(|entry| entry.id.clone())
        .collect();
    assert_eq!(review.evidence_entry_ids, entry_ids);
    assert_eq!(review.evidence_comment_ids, vec![bundle.comments[0].id.clone()]);
    assert_eq!(review.created_at, WEEK_TWO + 5_000);

    assert_eq!(fixture.service.review(&review.id).unwrap(), review);
    assert_eq!(
        fixture.service.reviews(DateRange::week_starting(WEEK_TWO)),
        vec![review.clone()]
    );
    assert!(fixture
        .service
        .reviews(DateRange::week_starting(WEEK_ONE))
        .is_empty());
}

#[test]
fn failed_render_stores_no_review() {
    let fixture = fixture();
    let version = fixture.service.snapshot().version();

    let err = fixture
        .service
        .record_review(
            &PluginRegistry::new(),
            &EvidenceQuery::new(DateRange::week_starting(WEEK_ONE)),
        )
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code, "plugin_not_selected");
    assert_eq!(fixture.service.snapshot().version(), version);
    assert!(fixture.service.reviews(DateRange::unbounded()).is_empty());
}
