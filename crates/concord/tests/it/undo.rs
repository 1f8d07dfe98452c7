use crate::helpers::sync;
use concord::{ContainerType, Document, UndoManager, UpdateOptions};
use serde_json::json;

#[test]
fn undo_then_redo_restores_the_pre_undo_state() {
    let mut doc = Document::with_peer(1);
    let mut undo = UndoManager::new(&mut doc);
    let list = doc
        .get_map("map")
        .unwrap()
        .insert_container("items", ContainerType::List)
        .unwrap();
    doc.get_list(&list).unwrap().push("a").unwrap();
    doc.commit();
    doc.get_list(&list).unwrap().push("b").unwrap();
    doc.get_map("map").unwrap().insert("title", "todo").unwrap();
    doc.commit();
    let before = doc.to_json();

    undo.undo(&mut doc).unwrap();
    assert_eq!(doc.to_json(), json!({"map": {"items": ["a"]}}));
    undo.redo(&mut doc).unwrap();
    assert_eq!(doc.to_json(), before);
}

#[test]
fn manual_commit_after_undo_clears_redo() {
    let mut doc = Document::with_peer(1);
    let mut undo = UndoManager::new(&mut doc);
    doc.get_text("text").unwrap().insert(0, "one").unwrap();
    doc.commit();
    doc.get_text("text").unwrap().insert(3, " two").unwrap();
    doc.commit();
    undo.undo(&mut doc).unwrap();
    assert!(undo.can_redo());

    doc.get_text("text").unwrap().insert(3, " three").unwrap();
    doc.commit();
    assert!(!undo.can_redo());
    assert!(!undo.redo(&mut doc).unwrap());
    assert_eq!(doc.get_text("text").unwrap().to_string(), "one three");
}

#[test]
fn undo_count_tracks_units() {
    let mut doc = Document::with_peer(1);
    let mut undo = UndoManager::new(&mut doc);
    for word in ["a", "b"] {
        doc.get_text("text").unwrap().insert(0, word).unwrap();
        doc.commit();
    }
    assert_eq!(undo.undo_count(), 2);
    undo.undo(&mut doc).unwrap();
    assert_eq!(undo.undo_count(), 1);
    undo.undo(&mut doc).unwrap();
    assert_eq!(undo.undo_count(), 0);
    assert!(!undo.undo(&mut doc).unwrap());
    assert_eq!(undo.redo_count(), 2);
}

#[test]
fn empty_stacks_are_a_no_op() {
    let mut doc = Document::with_peer(1);
    let mut undo = UndoManager::new(&mut doc);
    assert!(!undo.undo(&mut doc).unwrap());
    assert!(!undo.redo(&mut doc).unwrap());
    assert!(doc.is_empty());
}

#[test]
fn undo_keeps_concurrent_remote_edits() {
    let mut a = Document::with_peer(1);
    let mut b = Document::with_peer(2);
    let mut undo = UndoManager::new(&mut a);
    a.get_map("map").unwrap().insert("mine", 1).unwrap();
    a.commit();
    b.get_map("map").unwrap().insert("theirs", 2).unwrap();
    b.commit();
    sync(&mut b, &mut a);
    undo.undo(&mut a).unwrap();
    assert_eq!(a.to_json(), json!({"map": {"theirs": 2}}));

    sync(&mut a, &mut b);
    assert_eq!(b.to_json(), a.to_json());
}

#[test]
fn undo_only_touches_the_undone_region() {
    let mut a = Document::with_peer(1);
    let mut b = Document::with_peer(2);
    a.get_text("text").unwrap().insert(0, "hello").unwrap();
    a.commit();
    sync(&mut a, &mut b);
    let mut undo = UndoManager::new(&mut a);
    a.get_text("text").unwrap().insert(5, " world").unwrap();
    a.commit();
    b.get_text("text").unwrap().insert(0, ">> ").unwrap();
    b.commit();
    sync(&mut b, &mut a);
    undo.undo(&mut a).unwrap();
    assert_eq!(a.get_text("text").unwrap().to_string(), ">> hello");
}

#[test]
fn dropping_the_manager_stops_recording() {
    let mut doc = Document::with_peer(1);
    let undo = UndoManager::new(&mut doc);
    drop(undo);
    doc.get_text("text").unwrap().insert(0, "x").unwrap();
    doc.commit();
    let mut fresh = UndoManager::new(&mut doc);
    assert_eq!(fresh.undo_count(), 0);
    assert!(!fresh.undo(&mut doc).unwrap());
}

#[test]
fn group_without_inner_commits_is_one_step() {
    let mut doc = Document::with_peer(1);
    let mut undo = UndoManager::new(&mut doc);
    doc.get_text("text").unwrap().insert(0, "initial").unwrap();
    doc.commit();

    undo.group_start(&mut doc);
    doc.get_text("text")
        .unwrap()
        .update("hello", UpdateOptions::default())
        .unwrap();
    doc.get_text("text")
        .unwrap()
        .update("world", UpdateOptions::default())
        .unwrap();
    undo.group_end(&mut doc);
    assert_eq!(undo.undo_count(), 2);

    assert!(undo.undo(&mut doc).unwrap());
    assert_eq!(doc.get_text("text").unwrap().to_string(), "initial");
    assert!(undo.redo(&mut doc).unwrap());
    assert_eq!(doc.get_text("text").unwrap().to_string(), "world");
}
