use crate::helpers::sync;
use concord::{ContainerType, Diff, DocEvent, Document, EventTriggerKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn recorder() -> (Arc<Mutex<Vec<DocEvent>>>, impl Fn(&DocEvent) + Send + Sync + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (events, move |e: &DocEvent| sink.lock().unwrap().push(e.clone()))
}

#[test]
fn root_subscriber_sees_local_commits() {
    let mut doc = Document::with_peer(1);
    let (events, callback) = recorder();
    let _sub = doc.subscribe_root(callback);
    doc.get_text("text").unwrap().insert(0, "abc").unwrap();
    assert!(events.lock().unwrap().is_empty());
    doc.commit();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].triggered_by, EventTriggerKind::Local);
    assert_eq!(events[0].events.len(), 1);
    match &events[0].events[0].diff {
        Diff::Text(delta) => assert_eq!(
            delta.iter().map(|d| d.to_json()).collect::<Vec<_>>(),
            vec![serde_json::json!({"insert": "abc"})]
        ),
        other => panic!("unexpected diff {other:?}"),
    }
}

#[test]
fn imports_are_reported_with_their_origin() {
    let mut a = Document::with_peer(1);
    a.get_counter("c").unwrap().increment(2.0).unwrap();
    let bytes = a.export(concord::ExportMode::Snapshot).unwrap();
    let mut b = Document::with_peer(2);
    let (events, callback) = recorder();
    let _sub = b.subscribe_root(callback);
    b.import_with(&bytes, "network").unwrap();
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].triggered_by, EventTriggerKind::Import);
    assert_eq!(events[0].origin, "network");
    assert_eq!(events[0].events[0].diff, Diff::Counter(2.0));
}

#[test]
fn unsubscribe_is_idempotent_and_final() {
    let mut doc = Document::with_peer(1);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let sub = doc.subscribe_root(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    doc.get_map("map").unwrap().insert("a", 1).unwrap();
    doc.commit();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    sub.unsubscribe();
    sub.unsubscribe();
    doc.get_map("map").unwrap().insert("b", 2).unwrap();
    doc.commit();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_subscriber_does_not_break_the_document() {
    let mut doc = Document::with_peer(1);
    let _bad = doc.subscribe_root(|_| panic!("subscriber bug"));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _good = doc.subscribe_root(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    doc.get_text("text").unwrap().insert(0, "still fine").unwrap();
    doc.commit();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(doc.get_text("text").unwrap().to_string(), "still fine");
    doc.get_text("text").unwrap().insert(0, "> ").unwrap();
    doc.commit();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn container_subscriber_only_hears_its_subtree() {
    let mut doc = Document::with_peer(1);
    let child = doc
        .get_map("map")
        .unwrap()
        .insert_container("list", ContainerType::List)
        .unwrap();
    doc.commit();
    let map_id = doc.get_map("map").unwrap().id().clone();
    let (events, callback) = recorder();
    let _sub = doc.subscribe(&map_id, callback);

    doc.get_text("elsewhere").unwrap().insert(0, "x").unwrap();
    doc.commit();
    assert!(events.lock().unwrap().is_empty());

    doc.get_list(&child).unwrap().push(1).unwrap();
    doc.commit();
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].current_target, Some(map_id));
    assert_eq!(events[0].events[0].target, child);
}

#[test]
fn local_update_bytes_replicate() {
    let mut a = Document::with_peer(1);
    let mut b = Document::with_peer(2);
    let sent = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
    let sink = sent.clone();
    let _sub = a.subscribe_local_update(move |bytes| sink.lock().unwrap().push(bytes.to_vec()));
    a.get_text("text").unwrap().insert(0, "hi").unwrap();
    a.commit();
    a.get_text("text").unwrap().insert(2, "!").unwrap();
    a.commit();
    for bytes in sent.lock().unwrap().iter() {
        b.import(bytes).unwrap();
    }
    assert_eq!(b.get_text("text").unwrap().to_string(), "hi!");
    sync(&mut b, &mut a);
    assert_eq!(a.len_changes(), 2);
}
