//! Integration tests for the storage engines behind `ObjectStore`

use ctxstack::entity::{Entity, Value};
use ctxstack::error::StorageError;
use ctxstack::store::{MemoryObjectStore, ObjectStore, SledObjectStore, WriteBatch};
use ctxstack::Schema;
use std::sync::Arc;
use tempfile::TempDir;

use crate::integration::model_schema;

fn entity(kind: &str, attributes: &[(&str, Value)]) -> Entity {
    let mut entity = Entity::new(kind);
    for (name, value) in attributes {
        entity.attributes.insert(name.to_string(), value.clone());
    }
    entity
}

/// Behaviour every engine must share.
fn exercise_engine(store: &dyn ObjectStore) {
    let first = entity("TestEntity", &[("rank", Value::Int(1))]);
    let second = entity("TestEntity", &[("rank", Value::Int(2))]);
    let account = entity("Account", &[("name", Value::from("ops"))]);

    store
        .apply(&WriteBatch {
            upserts: vec![second.clone(), first.clone(), account.clone()],
            deletes: vec![],
        })
        .unwrap();

    assert_eq!(store.get(&first.id).unwrap(), Some(first.clone()));
    let scanned = store.scan("TestEntity").unwrap();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(scanned.iter().map(|e| e.id).collect::<Vec<_>>(), expected);
    assert_eq!(store.scan("Account").unwrap().len(), 1);

    // A batch with one invalid row writes nothing.
    let nameless = entity("Account", &[]);
    let err = store
        .apply(&WriteBatch {
            upserts: vec![nameless.clone()],
            deletes: vec![first.id],
        })
        .unwrap_err();
    assert!(matches!(err, StorageError::ValidationFailed { .. }));
    assert!(store.get(&nameless.id).unwrap().is_none());
    assert!(store.get(&first.id).unwrap().is_some());

    let mut updated = second.clone();
    updated.attributes.insert("rank".to_string(), Value::Int(20));
    store
        .apply(&WriteBatch {
            upserts: vec![updated.clone()],
            deletes: vec![first.id],
        })
        .unwrap();
    assert!(store.get(&first.id).unwrap().is_none());
    assert_eq!(store.get(&second.id).unwrap(), Some(updated));
    store.flush().unwrap();
}

#[test]
fn test_memory_engine_contract() {
    let store = MemoryObjectStore::new(Arc::new(model_schema()));
    exercise_engine(&store);
    assert_eq!(store.len(), 2);
    assert!(store.path().is_none());
}

#[test]
fn test_sled_engine_contract() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("contract.db");
    let store = SledObjectStore::open(&path, Arc::new(model_schema())).unwrap();
    exercise_engine(&store);
    assert_eq!(store.len(), 2);
    assert_eq!(store.path(), Some(path.as_path()));
}

#[test]
fn test_sled_engine_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("persist.db");
    let schema = Arc::new(model_schema());
    let saved = entity("TestEntity", &[("testEntityAttribute", Value::from("kept"))]);

    {
        let store = SledObjectStore::open(&path, schema.clone()).unwrap();
        store
            .apply(&WriteBatch {
                upserts: vec![saved.clone()],
                deletes: vec![],
            })
            .unwrap();
        store.flush().unwrap();
    }

    let store = SledObjectStore::open(&path, schema).unwrap();
    assert_eq!(store.get(&saved.id).unwrap(), Some(saved.clone()));
    assert!(store.contains(&saved.id).unwrap());
}

#[test]
fn test_sled_engine_rejects_other_schema_version() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("versioned.db");

    drop(SledObjectStore::open(&path, Arc::new(model_schema())).unwrap());

    let mut newer: Schema = model_schema();
    newer.version += 1;
    let err = SledObjectStore::open(&path, Arc::new(newer)).err().unwrap();
    assert!(matches!(err, StorageError::SchemaMismatch { .. }));
}
