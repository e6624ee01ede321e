use kanban_core::{
    Board, KanbanError, KanbanService, NewStory, NewTask, Story, StoryPatch, TaskId,
};

fn seeded(code: &str) -> (KanbanService, Board, Story) {
    let service = KanbanService::open_in_memory().unwrap();
    let board = service.create_board("Main", None).unwrap();
    let story = service.create_story(NewStory::new(code, "Story")).unwrap();
    (service, board, story)
}

fn first_column(service: &KanbanService, board: &Board) -> String {
    let snapshot = service.snapshot();
    snapshot.store().columns_of_board(&board.id)[0].id.clone()
}

fn add_task(service: &KanbanService, story: &Story, column_id: &str) -> TaskId {
    service
        .create_task(NewTask::new(story.id.clone(), column_id, "work"))
        .unwrap()
        .id
}

#[test]
fn task_ids_are_sequential_and_padded() {
    let (service, board, story) = seeded("ALPHA");
    let column_id = first_column(&service, &board);

    let ids: Vec<TaskId> = (0..12)
        .map(|_| add_task(&service, &story, &column_id))
        .collect();

    let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
    assert_eq!(rendered[0], "ALPHA-001");
    assert_eq!(rendered[11], "ALPHA-012");
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn deleted_task_numbers_are_never_reissued() {
    let (service, board, story) = seeded("ALPHA");
    let column_id = first_column(&service, &board);
    add_task(&service, &story, &column_id);
    let second = add_task(&service, &story, &column_id);

    service.hard_delete(&second.to_string(), true).unwrap();
    let third = add_task(&service, &story, &column_id);
    assert_eq!(third.to_string(), "ALPHA-003");
}

#[test]
fn allocation_without_task_consumes_the_number() {
    let (service, board, story) = seeded("ALPHA");
    let column_id = first_column(&service, &board);

    let reserved = service.allocate_task_id("alpha").unwrap();
    assert_eq!(reserved.to_string(), "ALPHA-001");
    let created = add_task(&service, &story, &column_id);
    assert_eq!(created.to_string(), "ALPHA-002");
}

#[test]
fn unknown_and_deleted_stories_cannot_allocate() {
    let (service, _board, story) = seeded("ALPHA");
    assert!(matches!(
        service.allocate_task_id("NOPE"),
        Err(KanbanError::UnknownStory(code)) if code == "NOPE"
    ));

    service.hard_delete(&story.id, true).unwrap();
    assert!(matches!(
        service.allocate_task_id("ALPHA"),
        Err(KanbanError::UnknownStory(_))
    ));
}

#[test]
fn deleted_story_keeps_its_code_reserved() {
    let (service, _board, story) = seeded("ALPHA");
    service.hard_delete(&story.id, true).unwrap();

    let err = service
        .create_story(NewStory::new("ALPHA", "Second alpha"))
        .unwrap_err();
    assert!(matches!(err, KanbanError::IntegrityViolation { .. }));
}

#[test]
fn story_code_changes_only_before_first_task() {
    let (service, board, story) = seeded("ALPHA");
    let column_id = first_column(&service, &board);

    let renamed = service
        .update_story(
            &story.id,
            StoryPatch {
                code: Some("beta".to_string()),
                ..StoryPatch::default()
            },
        )
        .unwrap();
    assert_eq!(renamed.code, "BETA");
    let snapshot = service.snapshot();
    assert!(snapshot.store().allocator().counter("ALPHA").is_none());
    assert!(snapshot.store().allocator().counter("BETA").is_some());
    drop(snapshot);

    let task_id = add_task(&service, &renamed, &column_id);
    assert_eq!(task_id.to_string(), "BETA-001");

    let err = service
        .update_story(
            &story.id,
            StoryPatch {
                code: Some("GAMMA".to_string()),
                ..StoryPatch::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, KanbanError::IntegrityViolation { .. }));
}

#[test]
fn duplicate_story_codes_are_rejected() {
    let (service, _board, _story) = seeded("ALPHA");
    let err = service
        .create_story(NewStory::new(" alpha ", "Duplicate"))
        .unwrap_err();
    assert!(matches!(err, KanbanError::IntegrityViolation { .. }));
    assert!(matches!(
        service.create_story(NewStory::new("1BAD", "Malformed")),
        Err(KanbanError::Validation(_))
    ));
}
