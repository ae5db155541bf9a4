//! Integration tests for the commit walk and its failure classification

use ctxstack::entity::{Entity, Value};
use ctxstack::error::{CommitError, StorageError};
use ctxstack::save::{commit, commit_on_interactive, commit_on_new_worker};
use ctxstack::stack::ContextStack;
use ctxstack::store::{MemoryObjectStore, ObjectStore, WriteBatch};
use ctxstack::types::ObjectId;
use ctxstack::Filter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::integration::{eventually, model_schema, temp_stack};

/// Memory engine that rejects writes while `failing` is set.
struct FlakyStore {
    inner: MemoryObjectStore,
    failing: AtomicBool,
}

impl ObjectStore for FlakyStore {
    fn get(&self, id: &ObjectId) -> Result<Option<Entity>, StorageError> {
        self.inner.get(id)
    }

    fn scan(&self, kind: &str) -> Result<Vec<Entity>, StorageError> {
        self.inner.scan(kind)
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected("disk full".to_string()));
        }
        self.inner.apply(batch)
    }
}

fn flaky_stack() -> (Arc<FlakyStore>, Arc<ContextStack>) {
    let schema = Arc::new(model_schema());
    let engine = Arc::new(FlakyStore {
        inner: MemoryObjectStore::new(schema.clone()),
        failing: AtomicBool::new(false),
    });
    let stack = ContextStack::with_engine(schema, engine.clone()).unwrap();
    (engine, stack)
}

#[test]
fn test_empty_commit_is_noop() {
    let (_dir, stack) = temp_stack();
    let outcome = commit(stack.interactive()).unwrap();
    assert!(outcome.is_noop());
}

#[test]
fn test_worker_commit_reaches_engine() {
    let (_dir, stack) = temp_stack();
    let worker = stack.new_worker().unwrap();
    let entity = worker
        .insert_with("TestEntity", [("testEntityAttribute", "test")])
        .unwrap();

    let outcome = commit(&worker).unwrap();
    assert_eq!(outcome.depth(), 1);
    assert_eq!(outcome.levels[0].context, worker.id());
    let change_set = outcome.levels[0].change_set.as_ref().unwrap();
    assert!(change_set.inserted.contains(&entity.id));

    let engine = stack.engine().unwrap();
    assert_eq!(engine.get(&entity.id).unwrap(), Some(entity));
    assert!(!worker.has_changes().unwrap());
}

#[test]
fn test_interactive_commit_walks_through_root() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    let entity = interactive.insert("TestEntity").unwrap();

    let outcome = commit(interactive).unwrap();
    let contexts: Vec<_> = outcome.levels.iter().map(|l| (l.level, l.context)).collect();
    assert_eq!(
        contexts,
        vec![(0, interactive.id()), (1, stack.root().id())]
    );

    assert!(!interactive.has_changes().unwrap());
    assert!(!stack.root().has_changes().unwrap());
    assert!(stack.engine().unwrap().get(&entity.id).unwrap().is_some());
}

#[test]
fn test_detached_chain_commits_every_level() {
    let (_dir, stack) = temp_stack();
    let middle = stack.detached_context(Some(stack.interactive()), false).unwrap();
    let leaf = stack.detached_context(Some(&middle), false).unwrap();
    let entity = leaf.insert("TestEntity").unwrap();

    let outcome = commit(&leaf).unwrap();
    assert_eq!(outcome.depth(), 4);
    assert_eq!(outcome.levels[3].context, stack.root().id());
    assert!(stack.engine().unwrap().get(&entity.id).unwrap().is_some());
}

#[test]
fn test_orphan_with_changes_has_no_engine_binding() {
    let (_dir, stack) = temp_stack();
    let orphan = stack.detached_context(None, false).unwrap();
    orphan.insert("TestEntity").unwrap();

    let err = commit(&orphan).unwrap_err();
    match err {
        CommitError::RootHasNoEngineBinding { context, level } => {
            assert_eq!(context, orphan.id());
            assert_eq!(level, 0);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(orphan.has_changes().unwrap());
}

#[test]
fn test_unbound_ancestor_fails_after_lower_levels_commit() {
    let (_dir, stack) = temp_stack();
    let orphan = stack.detached_context(None, false).unwrap();
    let child = stack.detached_context(Some(&orphan), false).unwrap();
    child.insert("TestEntity").unwrap();

    let err = commit(&child).unwrap_err();
    assert!(matches!(
        err,
        CommitError::RootHasNoEngineBinding { level: 1, context } if context == orphan.id()
    ));
    assert!(!child.has_changes().unwrap());
    assert!(orphan.has_changes().unwrap());
}

#[test]
fn test_root_rejection_leaves_lower_levels_committed() {
    let (_dir, stack) = temp_stack();
    let interactive = stack.interactive();
    // `name` is required on Account, so the engine refuses the row.
    interactive.insert("Account").unwrap();

    let err = commit(interactive).unwrap_err();
    match err {
        CommitError::EngineCommitFailed {
            level,
            context,
            source,
        } => {
            assert_eq!(level, 1);
            assert_eq!(context, stack.root().id());
            assert!(matches!(source, StorageError::ValidationFailed { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(!interactive.has_changes().unwrap());
    assert!(stack.root().has_changes().unwrap());
    assert_eq!(stack.engine().unwrap().scan("Account").unwrap().len(), 0);
}

#[test]
fn test_failed_engine_write_keeps_changes_for_retry() {
    let (engine, stack) = flaky_stack();
    let worker = stack.new_worker().unwrap();
    let entity = worker.insert("TestEntity").unwrap();

    engine.failing.store(true, Ordering::SeqCst);
    let err = commit(&worker).unwrap_err();
    assert!(matches!(
        err,
        CommitError::EngineCommitFailed {
            level: 0,
            source: StorageError::Rejected(_),
            ..
        }
    ));
    assert!(worker.has_changes().unwrap());

    engine.failing.store(false, Ordering::SeqCst);
    commit(&worker).unwrap();
    assert!(engine.get(&entity.id).unwrap().is_some());
}

#[test]
fn test_dropped_parent_is_parent_unavailable() {
    let (_dir, stack) = temp_stack();
    let parent = stack.detached_context(None, true).unwrap();
    let parent_id = parent.id();
    let child = stack.detached_context(Some(&parent), false).unwrap();
    drop(parent);

    child.insert("TestEntity").unwrap();
    let err = commit(&child).unwrap_err();
    assert!(matches!(
        err,
        CommitError::ParentUnavailable { context, parent }
            if context == child.id() && parent == parent_id
    ));
}

#[test]
fn test_commit_on_interactive_returns_mutator_value() {
    let (_dir, stack) = temp_stack();
    let id = commit_on_interactive(&stack, |session| {
        session
            .insert_with("TestEntity", [("rank", 7)])
            .map(|entity| entity.id)
    })
    .unwrap()
    .unwrap();

    assert!(!stack.interactive().has_changes().unwrap());
    assert!(stack.engine().unwrap().get(&id).unwrap().is_some());
}

#[test]
fn test_commit_on_interactive_swallows_commit_failure() {
    let (_dir, stack) = temp_stack();
    let value = commit_on_interactive(&stack, |session| {
        session.insert("Account").is_ok()
    })
    .unwrap();

    assert!(value);
    // The failure is at the root; the row is parked there.
    assert!(stack.root().has_changes().unwrap());
}

#[test]
fn test_commit_on_new_worker_is_fire_and_forget() {
    let (_dir, stack) = temp_stack();
    commit_on_new_worker(&stack, |session| {
        session
            .insert_with("TestEntity", [("testEntityAttribute", Value::from("bg"))])
            .unwrap();
    })
    .unwrap();

    let interactive = stack.interactive().clone();
    assert!(eventually(|| {
        interactive
            .count("TestEntity", Some(Filter::eq("testEntityAttribute", "bg")))
            .unwrap()
            == 1
    }));
}
