use kanban_core::{
    EntityKind, KanbanService, NewStory, NewTask, SearchFilters, StoryPatch, TaskId,
};

fn seeded() -> (KanbanService, String, String) {
    let service = KanbanService::open_in_memory().unwrap();
    let board = service.create_board("Main", None).unwrap();
    let column = service.snapshot().store().columns_of_board(&board.id)[0]
        .id
        .clone();
    let alpha = service.create_story(NewStory::new("ALPHA", "Payments")).unwrap();
    let beta = service.create_story(NewStory::new("BETA", "Reporting")).unwrap();
    let first = service
        .create_task(NewTask::new(alpha.id.clone(), column.clone(), "Refund flow"))
        .unwrap();
    service
        .create_task(NewTask::new(beta.id.clone(), column, "Refund report"))
        .unwrap();
    service
        .add_comment(&first.id, "sam", "refund needs a.b config")
        .unwrap();
    (service, alpha.id, beta.id)
}

#[test]
fn matching_is_case_insensitive_and_ordered_by_kind() {
    let (service, _, _) = seeded();
    let hits = service.search("REFUND", &SearchFilters::default()).unwrap();
    let kinds: Vec<EntityKind> = hits.iter().map(|hit| hit.kind).collect();
    assert_eq!(
        kinds,
        vec![EntityKind::Task, EntityKind::Task, EntityKind::Comment]
    );
    assert_eq!(hits[0].id, "ALPHA-001");
    assert_eq!(hits[0].field, "title");
    assert_eq!(hits[1].id, "BETA-001");
}

#[test]
fn archived_entities_need_opt_in() {
    let (service, _, _) = seeded();
    service.archive("BETA-001").unwrap();
    let visible = service.search("report", &SearchFilters::default()).unwrap();
    assert!(visible.iter().all(|hit| hit.id != "BETA-001"));

    let filters = SearchFilters {
        include_archived: true,
        ..SearchFilters::default()
    };
    let all = service.search("report", &filters).unwrap();
    assert!(all.iter().any(|hit| hit.id == "BETA-001"));
}

#[test]
fn story_filter_limits_scope() {
    let (service, alpha, _) = seeded();
    let filters = SearchFilters {
        story_id: Some(alpha.clone()),
        kinds: vec![EntityKind::Task],
        ..SearchFilters::default()
    };
    let hits = service.search("refund", &filters).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, TaskId::parse("ALPHA-001").unwrap().to_string());

    service
        .update_story(
            &alpha,
            StoryPatch {
                description: Some("Card refunds".to_string()),
                ..StoryPatch::default()
            },
        )
        .unwrap();
    let stories = SearchFilters {
        kinds: vec![EntityKind::Story],
        ..SearchFilters::default()
    };
    let story_hits = service.search("card", &stories).unwrap();
    assert_eq!(story_hits.len(), 1);
    assert_eq!(story_hits[0].id, alpha);
    assert_eq!(story_hits[0].field, "description");
}

#[test]
fn text_is_matched_literally() {
    let (service, _, _) = seeded();
    assert_eq!(service.search("a.b", &SearchFilters::default()).unwrap().len(), 1);
    assert!(service.search("a*b", &SearchFilters::default()).unwrap().is_empty());
    assert!(service.search("   ", &SearchFilters::default()).unwrap().is_empty());
}

#[test]
fn limit_truncates_hits() {
    let (service, _, _) = seeded();
    let filters = SearchFilters {
        limit: 2,
        ..SearchFilters::default()
    };
    assert_eq!(service.search("refund", &filters).unwrap().len(), 2);
}
