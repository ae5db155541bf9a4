//! Integration tests for the query facade

use ctxstack::error::QueryError;
use ctxstack::filter::CompareOp;
use ctxstack::save::commit;
use ctxstack::{FetchRequest, Filter, SortDescriptor, Value};
use std::sync::mpsc;
use std::time::Duration;

use crate::integration::temp_stack;

#[test]
fn test_unknown_kind_is_rejected() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();

    assert!(matches!(
        interactive.insert("Nope").unwrap_err(),
        QueryError::UnknownEntityKind(kind) if kind == "Nope"
    ));
    assert!(matches!(
        interactive.fetch_many(FetchRequest::new("Nope")).unwrap_err(),
        QueryError::UnknownEntityKind(_)
    ));
    assert!(!interactive.has_changes().unwrap());
}

#[test]
fn test_values_are_checked_against_schema() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();

    let err = interactive
        .insert_with("TestEntity", [("rank", "high")])
        .unwrap_err();
    assert!(matches!(err, QueryError::TypeMismatch { .. }));

    let err = interactive
        .insert_with("TestEntity", [("colour", "red")])
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownAttribute { .. }));

    let entity = interactive.insert("TestEntity").unwrap();
    assert!(matches!(
        interactive.set(entity.id, "rank", 1.5).unwrap_err(),
        QueryError::TypeMismatch { .. }
    ));
}

#[test]
fn test_fetch_filters_sorts_and_limits() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    for (label, rank) in [("a", 3), ("b", 1), ("c", 2), ("d", 5)] {
        interactive
            .insert_with(
                "TestEntity",
                [
                    ("testEntityAttribute", Value::from(label)),
                    ("rank", Value::from(rank)),
                ],
            )
            .unwrap();
    }

    let request = FetchRequest::new("TestEntity")
        .filter(Filter::parse("rank < 5").unwrap())
        .order_by(SortDescriptor::descending("rank"))
        .limit(2);
    let rows = interactive.fetch_many(request).unwrap();
    let labels: Vec<_> = rows
        .iter()
        .map(|e| e.get("testEntityAttribute").clone())
        .collect();
    assert_eq!(labels, vec![Value::from("a"), Value::from("c")]);
}

#[test]
fn test_fetch_sees_pending_and_committed_rows() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    interactive.insert("TestEntity").unwrap();
    commit(interactive).unwrap();
    interactive.insert("TestEntity").unwrap();

    assert_eq!(interactive.count("TestEntity", None).unwrap(), 2);
    assert_eq!(
        stack.engine().unwrap().scan("TestEntity").unwrap().len(),
        1
    );
}

#[test]
fn test_fetch_or_insert_reuses_match() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    let filter = Filter::eq("testEntityAttribute", "only");

    let first = interactive.fetch_or_insert("TestEntity", filter.clone()).unwrap();
    assert_eq!(first.get("testEntityAttribute"), &Value::from("only"));

    let second = interactive.fetch_or_insert("TestEntity", filter).unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(interactive.count("TestEntity", None).unwrap(), 1);
}

#[test]
fn test_fetch_or_insert_seeds_only_equality_clauses() {
    let (_dir, stack) = temp_stack();
    let filter = Filter::eq("testEntityAttribute", "x").and("rank", CompareOp::Gt, 3);

    let entity = stack
        .interactive()
        .fetch_or_insert("TestEntity", filter)
        .unwrap();
    assert_eq!(entity.get("testEntityAttribute"), &Value::from("x"));
    assert!(entity.get("rank").is_null());
}

#[test]
fn test_delete_matching_honours_filter() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    for label in ["keep", "drop", "drop"] {
        interactive
            .insert_with("TestEntity", [("testEntityAttribute", label)])
            .unwrap();
    }
    commit(interactive).unwrap();

    let deleted = interactive
        .delete_matching("TestEntity", Some(Filter::eq("testEntityAttribute", "drop")))
        .unwrap();
    assert_eq!(deleted, 2);
    commit(interactive).unwrap();

    let rows = stack.engine().unwrap().scan("TestEntity").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("testEntityAttribute"), &Value::from("keep"));
}

#[test]
fn test_delete_matching_without_filter_clears_kind() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    interactive.insert("TestEntity").unwrap();
    interactive.insert("TestEntity").unwrap();
    interactive
        .insert_with("Account", [("name", "ops")])
        .unwrap();

    assert_eq!(interactive.delete_matching("TestEntity", None).unwrap(), 2);
    assert_eq!(interactive.count("TestEntity", None).unwrap(), 0);
    assert_eq!(interactive.count("Account", None).unwrap(), 1);
}

#[test]
fn test_delete_of_pending_insert_leaves_no_trace() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    let entity = interactive.insert("TestEntity").unwrap();
    assert!(interactive.delete(entity.id).unwrap());
    assert!(!interactive.has_changes().unwrap());
    assert!(!interactive.delete(entity.id).unwrap());
}

#[test]
fn test_set_on_missing_object_is_not_found() {
    let (_dir, stack) = temp_stack();
    let id = ctxstack::ObjectId::new();
    assert!(matches!(
        stack.interactive().set(id, "rank", 1).unwrap_err(),
        QueryError::ObjectNotFound(missing) if missing == id
    ));
}

#[test]
fn test_fetch_async_completes_once_with_empty_result() {
    let (_dir, stack) = temp_stack();
    let (tx, rx) = mpsc::channel();

    let queued = stack
        .interactive()
        .fetch_async(FetchRequest::new("TestEntity"), move |result| {
            tx.send(result.map(|rows| rows.len())).unwrap();
        });
    assert!(queued);

    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result.unwrap(), 0);
    // The sender was consumed by the one completion.
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_fetch_async_rejects_invalid_request() {
    let (_dir, stack) = temp_stack();
    let (tx, rx) = mpsc::channel::<()>();

    let queued = stack.interactive().fetch_async(
        FetchRequest::new("TestEntity").filter(Filter::eq("colour", "red")),
        move |_| {
            let _ = tx.send(());
        },
    );
    assert!(!queued);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[tokio::test]
async fn test_fetch_future_delivers_rows() {
    let (_dir, stack) = temp_stack();
    let worker = stack.new_worker().unwrap();
    worker
        .insert_with("TestEntity", [("testEntityAttribute", "async")])
        .unwrap();
    commit(&worker).unwrap();

    let receiver = stack
        .interactive()
        .fetch_future(FetchRequest::new("TestEntity"))
        .unwrap();
    let rows = receiver.await.unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("testEntityAttribute"), &Value::from("async"));
}

#[test]
fn test_child_context_overlays_ancestor_changes() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    let committed = interactive.insert("TestEntity").unwrap();
    commit(interactive).unwrap();

    let pending = interactive.insert("TestEntity").unwrap();
    let child = stack.detached_context(Some(interactive), false).unwrap();
    assert_eq!(child.count("TestEntity", None).unwrap(), 2);

    assert!(child.delete(committed.id).unwrap());
    child.set(pending.id, "rank", 9).unwrap();
    assert_eq!(child.count("TestEntity", None).unwrap(), 1);
    assert_eq!(
        child.object(pending.id).unwrap().unwrap().get("rank"),
        &Value::Int(9)
    );

    // The parent is untouched until the child commits.
    assert_eq!(interactive.count("TestEntity", None).unwrap(), 2);
    assert!(interactive
        .object(pending.id)
        .unwrap()
        .unwrap()
        .get("rank")
        .is_null());
}

#[test]
fn test_sort_by_nan_float_keeps_context_usable() {
    let (_dir, stack) = temp_stack();
    let worker = stack.new_worker().unwrap();
    for i in 0..64 {
        let balance = if i % 3 == 0 { f64::NAN } else { i as f64 };
        worker
            .insert_with(
                "Account",
                [("name", Value::from("acct")), ("balance", Value::from(balance))],
            )
            .unwrap();
    }

    let rows = worker
        .fetch_many(FetchRequest::new("Account").order_by(SortDescriptor::ascending("balance")))
        .unwrap();
    assert_eq!(rows.len(), 64);
    assert_eq!(rows[0].get("balance"), &Value::Float(1.0));
    assert!(matches!(rows[63].get("balance"), Value::Float(x) if x.is_nan()));

    worker.insert_with("Account", [("name", "after")]).unwrap();
    assert_eq!(worker.count("Account", None).unwrap(), 65);
}
