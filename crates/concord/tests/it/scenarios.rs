use concord::{ContainerType, Document, Frontiers, TreeParentId, UndoManager, UpdateOptions};
use serde_json::json;

#[test]
fn insert_commit_read_back() {
    let mut doc = Document::new();
    doc.get_text("text").unwrap().insert(0, "abc").unwrap();
    doc.commit();
    assert_eq!(doc.get_text("text").unwrap().to_string(), "abc");
}

#[test]
fn diff_between_frontiers_reaches_a_fresh_replica() {
    let mut a = Document::with_peer(1);
    let mut b = Document::with_peer(2);
    let before = a.oplog_frontiers().clone();
    assert_eq!(before, Frontiers::new());
    a.get_text("text").unwrap().insert(0, "abc").unwrap();
    a.commit();
    let after = a.oplog_frontiers().clone();
    let diff = a.diff(&before, &after).unwrap();
    b.apply_diff(&diff).unwrap();
    assert_eq!(b.get_text("text").unwrap().to_string(), "abc");
    assert_eq!(a.oplog_vv(), b.oplog_vv());
}

#[test]
fn counter_integer_and_float_steps() {
    let mut doc = Document::new();
    let mut counter = doc.get_counter("counter").unwrap();
    assert_eq!(counter.value(), 0.0);
    counter.increment(1.0).unwrap();
    assert_eq!(counter.value(), 1.0);
    counter.decrement(1.0).unwrap();
    assert_eq!(counter.value(), 0.0);
    counter.increment(1.2).unwrap();
    assert_eq!(counter.value(), 1.2);
    counter.decrement(2.0).unwrap();
    assert_eq!(counter.value(), -0.8);
}

#[test]
fn map_with_nested_list() {
    let mut doc = Document::new();
    let mut map = doc.get_map("map").unwrap();
    map.insert("key", "value").unwrap();
    let list = map.insert_container("key2", ContainerType::List).unwrap();
    doc.get_list(&list).unwrap().insert(0, "value2").unwrap();
    doc.commit();
    assert_eq!(
        doc.get_map("map").unwrap().get_deep_value().to_json(),
        json!({"key": "value", "key2": ["value2"]})
    );
}

#[test]
fn tree_root_and_child() {
    let mut doc = Document::new();
    let mut tree = doc.get_tree("tree").unwrap();
    let root = tree.create(None).unwrap();
    let child = tree.create(Some(root)).unwrap();
    assert_eq!(tree.children(root), vec![child]);
    assert_eq!(tree.children(TreeParentId::Root), vec![root]);
}

#[test]
fn undo_group_is_one_unit() {
    let mut doc = Document::new();
    let mut undo = UndoManager::new(&mut doc);
    undo.group_start(&mut doc);
    doc.get_text("text")
        .unwrap()
        .update("hello", UpdateOptions::default())
        .unwrap();
    doc.commit();
    doc.get_text("text")
        .unwrap()
        .update("world", UpdateOptions::default())
        .unwrap();
    doc.commit();
    undo.group_end(&mut doc);
    assert_eq!(undo.undo_count(), 1);

    assert!(undo.undo(&mut doc).unwrap());
    assert_eq!(doc.get_text("text").unwrap().to_string(), "");
    assert_eq!(undo.undo_count(), 0);

    assert!(undo.redo(&mut doc).unwrap());
    assert_eq!(doc.get_text("text").unwrap().to_string(), "world");
    assert_eq!(undo.undo_count(), 1);
}
