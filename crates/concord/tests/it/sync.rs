use concord::{ContainerType, DocError, Document, ExportMode, VersionVector};

#[test]
fn importing_twice_changes_nothing() {
    let mut a = Document::with_peer(1);
    a.get_text("text").unwrap().insert(0, "hello").unwrap();
    a.get_list("list").unwrap().push(1).unwrap();
    let bytes = a.export(ExportMode::Snapshot).unwrap();

    let mut b = Document::with_peer(2);
    b.import(&bytes).unwrap();
    let once = b.to_json();
    let vv = b.oplog_vv().clone();
    let again = b.import(&bytes).unwrap();
    assert!(again.success.is_empty());
    assert_eq!(b.to_json(), once);
    assert_eq!(b.oplog_vv(), &vv);
    assert_eq!(b.len_changes(), a.len_changes());
}

#[test]
fn out_of_order_updates_wait_for_their_deps() {
    let mut a = Document::with_peer(1);
    a.get_text("text").unwrap().insert(0, "ab").unwrap();
    a.commit();
    let first = a.export(ExportMode::Snapshot).unwrap();
    let vv = a.oplog_vv().clone();
    a.get_text("text").unwrap().insert(2, "cd").unwrap();
    a.commit();
    let second = a.export(ExportMode::Updates { from: vv }).unwrap();

    let mut b = Document::with_peer(2);
    let status = b.import(&second).unwrap();
    assert!(status.pending.is_some());
    assert!(b.has_pending_ops());
    assert_eq!(b.get_text("text").unwrap().to_string(), "");

    let status = b.import(&first).unwrap();
    assert!(status.pending.is_none());
    assert!(!b.has_pending_ops());
    assert_eq!(b.get_text("text").unwrap().to_string(), "abcd");
    assert_eq!(b.oplog_vv(), a.oplog_vv());
}

#[test]
fn import_batch_accepts_any_order() {
    let mut a = Document::with_peer(1);
    let mut payloads = Vec::new();
    let mut vv = VersionVector::new();
    for word in ["one ", "two ", "three"] {
        let len = a.get_text("text").unwrap().len_unicode();
        a.get_text("text").unwrap().insert(len, word).unwrap();
        a.commit();
        payloads.push(a.export(ExportMode::Updates { from: vv.clone() }).unwrap());
        vv = a.oplog_vv().clone();
    }
    payloads.reverse();
    let mut b = Document::with_peer(2);
    b.import_batch(&payloads).unwrap();
    assert_eq!(b.get_text("text").unwrap().to_string(), "one two three");
}

#[test]
fn corrupted_payload_is_rejected_whole() {
    let mut a = Document::with_peer(1);
    a.get_text("text").unwrap().insert(0, "hello").unwrap();
    let bytes = a.export(ExportMode::Snapshot).unwrap();

    let mut b = Document::with_peer(2);
    b.get_text("text").unwrap().insert(0, "mine").unwrap();
    b.commit();
    let before = b.to_json();
    let vv = b.oplog_vv().clone();

    let truncated = &bytes[..bytes.len() - 1];
    assert!(matches!(b.import(truncated), Err(DocError::Decode(_))));
    assert!(matches!(b.import(b"not a payload"), Err(DocError::Decode(_))));
    assert!(matches!(b.import(&[]), Err(DocError::Decode(_))));
    assert_eq!(b.to_json(), before);
    assert_eq!(b.oplog_vv(), &vv);

    b.import(&bytes).unwrap();
    let merged = b.get_text("text").unwrap().to_string();
    assert!(merged.contains("hello") && merged.contains("mine"));
}

#[test]
fn a_bad_payload_in_a_batch_rejects_the_batch() {
    let mut a = Document::with_peer(1);
    a.get_text("text").unwrap().insert(0, "x").unwrap();
    let good = a.export(ExportMode::Snapshot).unwrap();
    let mut b = Document::with_peer(2);
    assert!(b.import_batch(&[good, vec![1, 2, 3]]).is_err());
    assert!(b.is_empty());
}

#[test]
fn reusing_a_root_name_with_another_type_fails() {
    let mut doc = Document::with_peer(1);
    doc.get_text("name").unwrap().insert(0, "x").unwrap();
    assert!(matches!(
        doc.get_map("name"),
        Err(DocError::TypeMismatch {
            existing: ContainerType::Text,
            requested: ContainerType::Map,
            ..
        })
    ));
}

#[test]
fn export_beyond_local_version_is_a_causal_gap() {
    let mut a = Document::with_peer(1);
    a.get_text("text").unwrap().insert(0, "x").unwrap();
    let mut to = a.oplog_vv().clone();
    to.set_end(99, 5);
    let err = a
        .export(ExportMode::UpdatesInRange {
            from: VersionVector::new(),
            to,
        })
        .unwrap_err();
    assert!(matches!(err, DocError::CausalGap(_)));
}

#[test]
fn json_updates_round_trip() {
    let mut a = Document::with_peer(1);
    a.get_text("text").unwrap().insert(0, "hi").unwrap();
    a.get_map("map").unwrap().insert("n", 3).unwrap();
    a.get_counter("c").unwrap().increment(1.5).unwrap();
    a.commit();
    let to = a.oplog_vv().clone();
    let json = a.export_json_updates(&VersionVector::new(), &to).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&json).is_ok());

    let mut b = Document::with_peer(2);
    b.import_json_updates(&json).unwrap();
    assert_eq!(b.to_json(), a.to_json());
    assert_eq!(b.oplog_vv(), a.oplog_vv());
    assert!(b.import_json_updates("{not json").is_err());
}

#[test]
fn fork_continues_independently() {
    let mut a = Document::with_peer(1);
    a.get_text("text").unwrap().insert(0, "base").unwrap();
    let mut b = a.fork();
    assert_ne!(a.peer_id(), b.peer_id());
    assert_eq!(b.get_text("text").unwrap().to_string(), "base");
    b.get_text("text").unwrap().insert(4, "!").unwrap();
    assert_eq!(a.get_text("text").unwrap().to_string(), "base");
}

#[test]
fn diff_of_unknown_frontier_is_a_causal_gap() {
    let mut a = Document::with_peer(1);
    a.get_text("text").unwrap().insert(0, "x").unwrap();
    a.commit();
    let mut b = Document::with_peer(2);
    let theirs = a.oplog_frontiers().clone();
    let err = b.diff(&concord::Frontiers::new(), &theirs).unwrap_err();
    assert!(matches!(err, DocError::CausalGap(_)));
}

#[test]
fn root_name_reused_with_two_types_resolves_the_same_everywhere() {
    let mut a = Document::with_peer(1);
    a.get_text("x").unwrap().insert(0, "hi").unwrap();
    a.commit();
    let mut b = Document::with_peer(2);
    b.get_map("x").unwrap().insert("k", 1).unwrap();
    b.commit();
    let text = a.export(ExportMode::Snapshot).unwrap();
    let map = b.export(ExportMode::Snapshot).unwrap();

    a.import(&map).unwrap();
    b.import(&text).unwrap();
    let mut c = Document::with_peer(3);
    c.import(&map).unwrap();
    c.import(&text).unwrap();
    let mut d = Document::with_peer(4);
    d.import(&text).unwrap();
    d.import(&map).unwrap();

    assert_eq!(a.oplog_vv(), b.oplog_vv());
    for doc in [&b, &c, &d] {
        assert_eq!(doc.to_json(), a.to_json());
    }
    assert_eq!(a.to_json(), serde_json::json!({"x": "hi"}));
    assert!(matches!(c.get_map("x"), Err(DocError::TypeMismatch { .. })));
    assert_eq!(d.get_text("x").unwrap().to_string(), "hi");
}
