//! End-to-end scenarios exercising the store through its public API,
//! one module per scenario.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use docdb::{CursorItem, Error, Mode, Store, Value};

fn doc(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn insert_get_update_delete() {
    let store = Store::new("scenario-1");

    let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
    let id = txn.create(doc(&[("title", Value::String("A".into()))])).unwrap();
    txn.commit().unwrap();

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    assert_eq!(reader.read(&id).unwrap().get("title"), Some(&Value::String("A".into())));
    reader.commit().unwrap();

    let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
    txn.update(&id, doc(&[("title", Value::String("B".into())), ("pages", Value::Integer(3))])).unwrap();
    txn.commit().unwrap();

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    let updated = reader.read(&id).unwrap();
    assert_eq!(updated.get("title"), Some(&Value::String("B".into())));
    assert_eq!(updated.get("pages"), Some(&Value::Integer(3)));
    reader.commit().unwrap();

    let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
    txn.delete(&id).unwrap();
    txn.commit().unwrap();

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    assert_eq!(reader.read(&id), Err(Error::DocumentDeleted));
}

#[test]
fn composite_range_query() {
    let store = Store::new("scenario-2");
    store.create_index("idx", vec!["cat".to_string(), "score".to_string()]).unwrap();

    let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
    let a1 = txn.create(doc(&[("cat", Value::String("A".into())), ("score", Value::Integer(10))])).unwrap();
    let a2 = txn.create(doc(&[("cat", Value::String("A".into())), ("score", Value::Integer(20))])).unwrap();
    let a3 = txn.create(doc(&[("cat", Value::String("A".into())), ("score", Value::Integer(30))])).unwrap();
    let b1 = txn.create(doc(&[("cat", Value::String("B".into())), ("score", Value::Integer(15))])).unwrap();
    let b2 = txn.create(doc(&[("cat", Value::String("B".into())), ("score", Value::Integer(25))])).unwrap();
    txn.commit().unwrap();

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    let found = reader
        .find_by_range("idx", &[Value::String("A".into()), Value::Integer(25)], &[Value::String("B".into()), Value::Integer(26)])
        .unwrap();

    let mut ids: Vec<String> = found.into_keys().collect();
    ids.sort();
    let mut expect = vec![a3, b1, b2];
    expect.sort();
    assert_eq!(ids, expect);
    let _ = (a1, a2);
}

#[test]
fn concurrent_updates_last_writer_wins() {
    let store = Store::new("scenario-3");
    let mut setup = store.open_transaction(Mode::ReadWrite).unwrap();
    let id = setup.create(doc(&[("counter", Value::Integer(0))])).unwrap();
    setup.commit().unwrap();

    const N: i64 = 100;
    let mut handles = Vec::new();
    for i in 1..=N {
        let store = Arc::clone(&store);
        let id = id.clone();
        handles.push(thread::spawn(move || loop {
            let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
            if txn.update(&id, doc(&[("counter", Value::Integer(i))])).is_ok() && txn.commit().is_ok() {
                break;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    match reader.read(&id).unwrap().get("counter") {
        Some(Value::Integer(n)) => assert!((1..=N).contains(n)),
        other => panic!("expected an integer counter, got {:?}", other),
    }
}

#[test]
fn snapshot_isolation_under_deletion() {
    let store = Store::new("scenario-4");
    let mut setup = store.open_transaction(Mode::ReadWrite).unwrap();
    let z = setup.create(doc(&[("k", Value::Integer(1))])).unwrap();
    setup.commit().unwrap();

    let t = store.open_transaction(Mode::ReadOnly).unwrap();

    let mut other = store.open_transaction(Mode::ReadWrite).unwrap();
    other.delete(&z).unwrap();
    other.commit().unwrap();

    assert_eq!(t.read(&z).unwrap().get("k"), Some(&Value::Integer(1)));
}

#[test]
fn index_update_on_field_removal() {
    let store = Store::new("scenario-5");
    store.create_index("by_status", vec!["status".to_string()]).unwrap();

    let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
    let w = txn.create(doc(&[("status", Value::String("pending".into()))])).unwrap();
    txn.commit().unwrap();

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    assert!(reader.find_by_index("by_status", &[Value::String("pending".into())]).unwrap().contains_key(&w));

    let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
    txn.update(&w, doc(&[("other", Value::Boolean(true))])).unwrap();
    txn.commit().unwrap();

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    assert!(reader.find_by_index("by_status", &[Value::String("pending".into())]).unwrap().is_empty());

    let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
    txn.update(&w, doc(&[("status", Value::String("archived".into()))])).unwrap();
    txn.commit().unwrap();

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    assert!(reader.find_by_index("by_status", &[Value::String("archived".into())]).unwrap().contains_key(&w));
    assert!(reader.find_by_index("by_status", &[Value::String("pending".into())]).unwrap().is_empty());
}

#[test]
fn cursor_stability_across_concurrent_delete() {
    let store = Store::new("scenario-6");
    let mut setup = store.open_transaction(Mode::ReadWrite).unwrap();
    let i1 = setup.create(doc(&[("n", Value::Integer(1))])).unwrap();
    let i2 = setup.create(doc(&[("n", Value::Integer(2))])).unwrap();
    let i3 = setup.create(doc(&[("n", Value::Integer(3))])).unwrap();
    setup.commit().unwrap();

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    let mut cursor = reader.cursor_all().unwrap();
    assert_eq!(cursor.count(), 3);

    let mut other = store.open_transaction(Mode::ReadWrite).unwrap();
    other.delete(&i2).unwrap();
    other.commit().unwrap();

    let mut seen_ids = Vec::new();
    let mut deleted_at = None;
    for position in 0..3 {
        match cursor.next().unwrap() {
            Some(CursorItem::Document(id, _)) => seen_ids.push(id),
            Some(CursorItem::Deleted(id)) => {
                deleted_at = Some(position);
                seen_ids.push(id);
            }
            None => panic!("expected an item at position {}", position),
        }
    }
    assert_eq!(seen_ids, vec![i1, i2, i3]);
    assert_eq!(deleted_at, Some(1));

    cursor.close();
    assert_eq!(cursor.next(), Err(Error::StreamClosed));
}

#[test]
fn no_partial_commit_is_observed() {
    let store = Store::new("scenario-p8");
    let mut setup = store.open_transaction(Mode::ReadWrite).unwrap();
    let a = setup.create(doc(&[("n", Value::Integer(1))])).unwrap();
    setup.commit().unwrap();

    let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
    let b = txn.create(doc(&[("n", Value::Integer(2))])).unwrap();
    txn.update(&a, doc(&[("n", Value::Integer(99))])).unwrap();
    txn.commit().unwrap();

    let reader = store.open_transaction(Mode::ReadOnly).unwrap();
    assert_eq!(reader.read(&a).unwrap().get("n"), Some(&Value::Integer(99)));
    assert_eq!(reader.read(&b).unwrap().get("n"), Some(&Value::Integer(2)));
}

#[test]
fn close_interlock_rejects_every_operation() {
    let store = Store::new("scenario-p9");
    let mut setup = store.open_transaction(Mode::ReadWrite).unwrap();
    let id = setup.create(doc(&[("n", Value::Integer(1))])).unwrap();
    setup.commit().unwrap();

    store.close();

    assert_eq!(store.open_transaction(Mode::ReadOnly).err(), Some(Error::StoreClosed));
    assert_eq!(store.create_index("late", vec!["n".to_string()]).err(), Some(Error::StoreClosed));
    let _ = id;
}
