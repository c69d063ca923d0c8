// Tests for the task progress registry

mod common;

use common::create_test_db;
use shelfsync_core::data::{DocumentStore, MemoryStore};
use shelfsync_core::error::CoreError;
use shelfsync_core::model::TaskStatus;
use shelfsync_core::progress::{TaskRegistry, TaskUpdate, UnitTally};
use std::sync::Arc;

fn registry() -> TaskRegistry {
    TaskRegistry::new(Arc::new(MemoryStore::new()))
}

/// Drive a batch the way the job runner does: one advance per unit, then the
/// final status from the tally.
fn run_units(registry: &TaskRegistry, id: &str, outcomes: &[bool]) {
    registry
        .advance(
            id,
            TaskUpdate::new()
                .status(TaskStatus::Running)
                .total(outcomes.len())
                .done(0),
        )
        .unwrap();

    let mut tally = UnitTally::default();
    for (i, ok) in outcomes.iter().enumerate() {
        let mut update = TaskUpdate::new().done(i + 1);
        if *ok {
            tally.record_success();
        } else {
            tally.record_failure();
            update = update.error(format!("unit {} failed", i));
        }
        registry.advance(id, update).unwrap();
    }
    registry
        .advance(id, TaskUpdate::new().status(tally.final_status()))
        .unwrap();
}

// ============================================================================
// Creation Tests
// ============================================================================

#[test]
fn test_create_task() {
    let registry = registry();
    let task = registry.create("t1", "discover_products", 4).unwrap();

    assert_eq!(task.kind, "discover_products");
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.total, 4);
    assert_eq!(task.done, 0);
    assert!(task.errors.is_empty());
    assert_eq!(registry.get("t1").unwrap(), Some(task));
}

#[test]
fn test_create_duplicate_rejected() {
    let registry = registry();
    registry.create("t1", "parse_products", 1).unwrap();

    let err = registry.create("t1", "parse_products", 1).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateTask(id) if id == "t1"));
}

#[test]
fn test_get_unknown_is_none() {
    assert!(registry().get("missing").unwrap().is_none());
}

#[test]
fn test_stored_under_type_key() {
    let store = Arc::new(MemoryStore::new());
    let registry = TaskRegistry::new(store.clone());
    registry.create("t1", "update_categories", 1).unwrap();

    let doc = store.load("progress").unwrap().unwrap();
    assert_eq!(doc["tasks"]["t1"]["type"], "update_categories");
    assert_eq!(doc["tasks"]["t1"]["status"], "running");
}

// ============================================================================
// Advance Tests
// ============================================================================

#[test]
fn test_partial_failure_finishes() {
    let registry = registry();
    registry.create("t1", "parse_products", 5).unwrap();

    run_units(&registry, "t1", &[true, true, false, true, true]);

    let task = registry.get("t1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Finished);
    assert_eq!(task.done, 5);
    assert_eq!(task.total, 5);
    assert_eq!(task.errors.len(), 1);
}

#[test]
fn test_all_units_failing_fails_task() {
    let registry = registry();
    registry.create("t1", "parse_products", 2).unwrap();

    run_units(&registry, "t1", &[false, false]);

    let task = registry.get("t1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.done, 2);
    assert_eq!(task.errors.len(), 2);
}

#[test]
fn test_done_never_goes_back() {
    let registry = registry();
    registry.create("t1", "parse_products", 5).unwrap();

    registry.advance("t1", TaskUpdate::new().done(3)).unwrap();
    let task = registry.advance("t1", TaskUpdate::new().done(1)).unwrap();
    assert_eq!(task.done, 3);
}

#[test]
fn test_restart_clears_errors() {
    let registry = registry();
    registry.create("t1", "parse_products", 2).unwrap();
    run_units(&registry, "t1", &[false, false]);

    let task = registry
        .advance(
            "t1",
            TaskUpdate::new()
                .status(TaskStatus::Running)
                .done(0)
                .error("retrying"),
        )
        .unwrap();

    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.done, 0);
    assert_eq!(task.errors, vec!["retrying".to_string()]);
}

#[test]
fn test_running_to_running_keeps_errors() {
    let registry = registry();
    registry.create("t1", "parse_products", 2).unwrap();
    registry.advance("t1", TaskUpdate::new().error("first")).unwrap();

    let task = registry
        .advance("t1", TaskUpdate::new().status(TaskStatus::Running))
        .unwrap();
    assert_eq!(task.errors.len(), 1);
}

#[test]
fn test_advance_unknown_creates_placeholder() {
    let registry = registry();
    let task = registry
        .advance("ghost", TaskUpdate::new().done(2).summary("late update"))
        .unwrap();

    assert_eq!(task.kind, "unknown");
    assert_eq!(task.done, 2);
    assert_eq!(task.summary.as_deref(), Some("late update"));
    assert!(registry.get("ghost").unwrap().is_some());
}

#[test]
fn test_products_found_recorded() {
    let registry = registry();
    registry.create("t1", "discover_products", 1).unwrap();
    let task = registry
        .advance("t1", TaskUpdate::new().products_found(7))
        .unwrap();
    assert_eq!(task.products_found, Some(7));
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[test]
fn test_tasks_survive_reopen() {
    let (temp_dir, db) = create_test_db();
    {
        let registry = TaskRegistry::new(Arc::new(db));
        registry.create("t1", "update_categories", 1).unwrap();
        registry
            .advance(
                "t1",
                TaskUpdate::new()
                    .done(1)
                    .status(TaskStatus::Finished)
                    .summary("ok"),
            )
            .unwrap();
    }

    let db = shelfsync_core::data::Database::new(&temp_dir.path().join("test.db")).unwrap();
    let registry = TaskRegistry::new(Arc::new(db));
    let task = registry.get("t1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Finished);
    assert_eq!(task.summary.as_deref(), Some("ok"));
}

#[test]
fn test_list_newest_first() {
    let registry = registry();
    registry.create("old", "parse_products", 1).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    registry.create("new", "parse_products", 1).unwrap();

    let ids: Vec<String> = registry.list().unwrap().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
}
