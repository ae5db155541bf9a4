//! Integration tests for worker-to-interactive change propagation

use ctxstack::save::commit;
use ctxstack::{ChangeFilter, Filter, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::integration::temp_stack;

#[test]
fn test_worker_insert_is_visible_on_interactive() {
    let (_dir, stack) = temp_stack();
    let worker = stack.new_worker().unwrap();
    worker
        .insert_with("TestEntity", [("testEntityAttribute", "test")])
        .unwrap();
    commit(&worker).unwrap();

    let rows = stack
        .interactive()
        .fetch_one("TestEntity", Some(Filter::eq("testEntityAttribute", "test")))
        .unwrap();
    assert!(rows.is_some());
    assert_eq!(
        stack
            .interactive()
            .count("TestEntity", Some(Filter::eq("testEntityAttribute", "test")))
            .unwrap(),
        1
    );
}

#[test]
fn test_object_fetched_by_id_matches_worker_copy() {
    let (_dir, stack) = temp_stack();
    let worker = stack.new_worker().unwrap();
    let entity = worker
        .insert_with("TestEntity", [("testEntityAttribute", "test")])
        .unwrap();
    commit(&worker).unwrap();

    let seen = stack.interactive().object(entity.id).unwrap().unwrap();
    assert_eq!(seen, entity);
}

#[test]
fn test_merge_refreshes_cached_objects() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    let entity = interactive
        .insert_with("TestEntity", [("rank", 1)])
        .unwrap();
    commit(interactive).unwrap();

    // Pull the object into Interactive's registered set.
    let cached = interactive.object(entity.id).unwrap().unwrap();
    assert_eq!(cached.get("rank"), &Value::Int(1));

    let worker = stack.new_worker().unwrap();
    worker.set(entity.id, "rank", 2).unwrap();
    commit(&worker).unwrap();

    let refreshed = interactive.object(entity.id).unwrap().unwrap();
    assert_eq!(refreshed.get("rank"), &Value::Int(2));
    let merges = interactive
        .perform_and_wait(|session| session.merge_count())
        .unwrap();
    assert_eq!(merges, 1);
}

#[test]
fn test_merge_leaves_uncached_inserts_to_fault_in() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    let worker = stack.new_worker().unwrap();
    let ids = (0..32)
        .map(|i| worker.insert_with("TestEntity", [("rank", i)]).unwrap().id)
        .collect::<Vec<_>>();
    commit(&worker).unwrap();

    let (merges, cached) = interactive
        .perform_and_wait({
            let ids = ids.clone();
            move |session| {
                let cached = ids.iter().filter(|id| session.is_registered(id)).count();
                (session.merge_count(), cached)
            }
        })
        .unwrap();
    assert_eq!(merges, 1);
    assert_eq!(cached, 0);

    let first = ids[0];
    let seen = interactive.object(first).unwrap().unwrap();
    assert_eq!(seen.get("rank"), &Value::Int(0));
    assert!(interactive
        .perform_and_wait(move |session| session.is_registered(&first))
        .unwrap());
}

#[test]
fn test_merge_evicts_deleted_objects() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    let entity = interactive.insert("TestEntity").unwrap();
    commit(interactive).unwrap();
    assert!(interactive.object(entity.id).unwrap().is_some());

    let worker = stack.new_worker().unwrap();
    assert!(worker.delete(entity.id).unwrap());
    commit(&worker).unwrap();

    assert!(interactive.object(entity.id).unwrap().is_none());
    assert!(!interactive
        .perform_and_wait(move |session| session.is_registered(&entity.id))
        .unwrap());
}

#[test]
fn test_merge_drops_pending_updates_to_deleted_objects() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    let entity = interactive.insert("TestEntity").unwrap();
    commit(interactive).unwrap();

    interactive.set(entity.id, "rank", 5).unwrap();
    assert!(interactive.has_changes().unwrap());

    let worker = stack.new_worker().unwrap();
    worker.delete(entity.id).unwrap();
    commit(&worker).unwrap();

    assert!(!interactive.has_changes().unwrap());
    assert_eq!(interactive.count("TestEntity", None).unwrap(), 0);
}

#[test]
fn test_interactive_commit_does_not_merge_into_itself() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    let _worker = stack.new_worker().unwrap();

    interactive.insert("TestEntity").unwrap();
    commit(interactive).unwrap();

    let merges = interactive
        .perform_and_wait(|session| session.merge_count())
        .unwrap();
    assert_eq!(merges, 0);
}

#[test]
fn test_every_committed_level_is_published() {
    let (_dir, stack) = temp_stack();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _subscription = stack.bus().subscribe(ChangeFilter::All, move |change_set| {
        assert!(!change_set.is_empty());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    stack.interactive().insert("TestEntity").unwrap();
    commit(stack.interactive()).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    // Nothing pending: nothing published.
    commit(stack.interactive()).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn test_dropped_worker_stops_merging() {
    let (_dir, stack) = temp_stack();
    let worker = stack.new_worker().unwrap();
    let worker_id = worker.id();
    drop(worker);

    assert_eq!(stack.bus().subscriber_count(), 0);
    assert!(stack.registry().resolve(worker_id).is_none());
}
