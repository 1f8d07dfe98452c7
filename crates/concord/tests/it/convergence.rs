use crate::helpers::{sync, sync_all};
use concord::{Document, ExportMode, TreeId, VersionVector};
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone)]
enum Action {
    TextInsert { peer: usize, pos: usize, ch: char },
    TextDelete { peer: usize, pos: usize },
    MapSet { peer: usize, key: u8, value: i64 },
    MapDelete { peer: usize, key: u8 },
    ListInsert { peer: usize, pos: usize, value: i64 },
    ListDelete { peer: usize, pos: usize },
    MovableMove { peer: usize, from: usize, to: usize },
    Counter { peer: usize, delta: i8 },
    TextMark { peer: usize, start: usize, len: usize, key: u8, on: bool },
    TreeCreate { peer: usize, parent: usize, index: usize },
    TreeMove { peer: usize, target: usize, parent: usize, index: usize },
    TreeDelete { peer: usize, target: usize },
    /// Reuses one root name with two container types.
    SharedRoot { peer: usize, as_text: bool, value: u8 },
    Sync { from: usize, to: usize },
}

const PEERS: usize = 3;

fn action() -> impl Strategy<Value = Action> {
    let peer = 0..PEERS;
    prop_oneof![
        (peer.clone(), any::<usize>(), proptest::char::range('a', 'z'))
            .prop_map(|(peer, pos, ch)| Action::TextInsert { peer, pos, ch }),
        (peer.clone(), any::<usize>()).prop_map(|(peer, pos)| Action::TextDelete { peer, pos }),
        (peer.clone(), 0u8..4, any::<i64>())
            .prop_map(|(peer, key, value)| Action::MapSet { peer, key, value }),
        (peer.clone(), 0u8..4).prop_map(|(peer, key)| Action::MapDelete { peer, key }),
        (peer.clone(), any::<usize>(), any::<i64>())
            .prop_map(|(peer, pos, value)| Action::ListInsert { peer, pos, value }),
        (peer.clone(), any::<usize>()).prop_map(|(peer, pos)| Action::ListDelete { peer, pos }),
        (peer.clone(), any::<usize>(), any::<usize>())
            .prop_map(|(peer, from, to)| Action::MovableMove { peer, from, to }),
        (peer.clone(), any::<i8>()).prop_map(|(peer, delta)| Action::Counter { peer, delta }),
        (peer.clone(), any::<usize>(), any::<usize>(), 0u8..2, any::<bool>())
            .prop_map(|(peer, start, len, key, on)| Action::TextMark { peer, start, len, key, on }),
        (peer.clone(), any::<usize>(), any::<usize>())
            .prop_map(|(peer, parent, index)| Action::TreeCreate { peer, parent, index }),
        (peer.clone(), any::<usize>(), any::<usize>(), any::<usize>()).prop_map(
            |(peer, target, parent, index)| Action::TreeMove { peer, target, parent, index }
        ),
        (peer.clone(), any::<usize>()).prop_map(|(peer, target)| Action::TreeDelete { peer, target }),
        (peer.clone(), any::<bool>(), any::<u8>())
            .prop_map(|(peer, as_text, value)| Action::SharedRoot { peer, as_text, value }),
        (peer.clone(), peer).prop_map(|(from, to)| Action::Sync { from, to }),
    ]
}

fn run(docs: &mut [Document], action: &Action) {
    match *action {
        Action::TextInsert { peer, pos, ch } => {
            let mut text = docs[peer].get_text("text").unwrap();
            let pos = pos % (text.len_unicode() + 1);
            text.insert(pos, &ch.to_string()).unwrap();
        }
        Action::TextDelete { peer, pos } => {
            let mut text = docs[peer].get_text("text").unwrap();
            if !text.is_empty() {
                let pos = pos % text.len_unicode();
                text.delete(pos, 1).unwrap();
            }
        }
        Action::MapSet { peer, key, value } => {
            let mut map = docs[peer].get_map("map").unwrap();
            map.insert(&format!("k{key}"), value).unwrap();
        }
        Action::MapDelete { peer, key } => {
            let mut map = docs[peer].get_map("map").unwrap();
            map.delete(&format!("k{key}")).unwrap();
        }
        Action::ListInsert { peer, pos, value } => {
            let mut list = docs[peer].get_list("list").unwrap();
            let pos = pos % (list.len() + 1);
            list.insert(pos, value).unwrap();
            let mut movable = docs[peer].get_movable_list("movable").unwrap();
            let pos = pos % (movable.len() + 1);
            movable.insert(pos, value).unwrap();
        }
        Action::ListDelete { peer, pos } => {
            let mut list = docs[peer].get_list("list").unwrap();
            if !list.is_empty() {
                let pos = pos % list.len();
                list.delete(pos, 1).unwrap();
            }
        }
        Action::MovableMove { peer, from, to } => {
            let mut movable = docs[peer].get_movable_list("movable").unwrap();
            if !movable.is_empty() {
                let len = movable.len();
                movable.mov(from % len, to % len).unwrap();
            }
        }
        Action::Counter { peer, delta } => {
            let mut counter = docs[peer].get_counter("counter").unwrap();
            counter.increment(f64::from(delta)).unwrap();
        }
        Action::TextMark { peer, start, len, key, on } => {
            let mut text = docs[peer].get_text("text").unwrap();
            let total = text.len_unicode();
            if total > 0 {
                let start = start % total;
                let end = start + 1 + len % (total - start);
                let key = ["bold", "link"][usize::from(key)];
                if on {
                    text.mark(start, end, key, true).unwrap();
                } else {
                    text.unmark(start, end, key).unwrap();
                }
            }
        }
        Action::TreeCreate { peer, parent, index } => {
            let mut tree = docs[peer].get_tree("tree").unwrap();
            let parent = pick_parent(&tree.nodes(), parent);
            let index = index % (tree.children_num(parent) + 1);
            tree.create_at(parent, index).unwrap();
        }
        Action::TreeMove { peer, target, parent, index } => {
            let mut tree = docs[peer].get_tree("tree").unwrap();
            let nodes = tree.nodes();
            if !nodes.is_empty() {
                let target = nodes[target % nodes.len()];
                let parent = pick_parent(&nodes, parent);
                let len = tree.children(parent).iter().filter(|n| **n != target).count();
                // Moves under the node's own subtree are refused locally.
                let _ = tree.mov_to(target, parent, index % (len + 1));
            }
        }
        Action::TreeDelete { peer, target } => {
            let mut tree = docs[peer].get_tree("tree").unwrap();
            let nodes = tree.nodes();
            if !nodes.is_empty() {
                tree.delete(nodes[target % nodes.len()]).unwrap();
            }
        }
        Action::SharedRoot { peer, as_text, value } => {
            // The name may already resolve to the other type here.
            if as_text {
                if let Ok(mut text) = docs[peer].get_text("shared") {
                    text.insert(0, &value.to_string()).unwrap();
                }
            } else if let Ok(mut map) = docs[peer].get_map("shared") {
                map.insert("v", i64::from(value)).unwrap();
            }
        }
        Action::Sync { from, to } => {
            if from != to {
                let (a, b) = pair(docs, from, to);
                sync(a, b);
            }
        }
    }
    docs[action_peer(action)].commit();
}

fn action_peer(action: &Action) -> usize {
    match *action {
        Action::TextInsert { peer, .. }
        | Action::TextDelete { peer, .. }
        | Action::MapSet { peer, .. }
        | Action::MapDelete { peer, .. }
        | Action::ListInsert { peer, .. }
        | Action::ListDelete { peer, .. }
        | Action::MovableMove { peer, .. }
        | Action::Counter { peer, .. }
        | Action::TextMark { peer, .. }
        | Action::TreeCreate { peer, .. }
        | Action::TreeMove { peer, .. }
        | Action::TreeDelete { peer, .. }
        | Action::SharedRoot { peer, .. } => peer,
        Action::Sync { to, .. } => to,
    }
}

/// `None` (the root level) or one of the live nodes.
fn pick_parent(nodes: &[TreeId], choice: usize) -> Option<TreeId> {
    match choice % (nodes.len() + 1) {
        0 => None,
        i => Some(nodes[i - 1]),
    }
}

/// Everything a replica shows: the JSON value plus text styles.
fn observed(doc: &mut Document) -> (serde_json::Value, Vec<serde_json::Value>) {
    let styles = doc
        .get_text("text")
        .unwrap()
        .to_delta()
        .iter()
        .map(|d| d.to_json())
        .collect();
    (doc.to_json(), styles)
}

fn pair(docs: &mut [Document], i: usize, j: usize) -> (&mut Document, &mut Document) {
    if i < j {
        let (left, right) = docs.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = docs.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

fn replicas() -> Vec<Document> {
    (1..=PEERS as u64).map(Document::with_peer).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replicas_converge(actions in proptest::collection::vec(action(), 1..40)) {
        let mut docs = replicas();
        for action in &actions {
            run(&mut docs, action);
        }
        sync_all(&mut docs);
        let expected = observed(&mut docs[0]);
        let vv = docs[0].oplog_vv().clone();
        for doc in &mut docs[1..] {
            prop_assert_eq!(&observed(doc), &expected);
            prop_assert_eq!(doc.oplog_vv(), &vv);
        }
    }

    #[test]
    fn delivery_order_does_not_matter(actions in proptest::collection::vec(action(), 1..30)) {
        let mut docs = replicas();
        for action in &actions {
            run(&mut docs, action);
        }
        let payloads: Vec<Vec<u8>> = docs
            .iter_mut()
            .map(|d| d.export(ExportMode::Updates { from: VersionVector::new() }).unwrap())
            .collect();
        let mut forward = Document::with_peer(100);
        for bytes in &payloads {
            forward.import(bytes).unwrap();
        }
        let mut backward = Document::with_peer(101);
        for bytes in payloads.iter().rev() {
            backward.import(bytes).unwrap();
        }
        prop_assert_eq!(observed(&mut forward), observed(&mut backward));
    }
}

#[test]
fn concurrent_map_writes_resolve_the_same_everywhere() {
    let mut docs = replicas();
    for (i, doc) in docs.iter_mut().enumerate() {
        doc.get_map("map").unwrap().insert("color", i as i64).unwrap();
        doc.commit();
    }
    sync_all(&mut docs);
    let winner = docs[0].get_map("map").unwrap().get("color");
    assert!(winner.is_some());
    for doc in &mut docs[1..] {
        assert_eq!(doc.get_map("map").unwrap().get("color"), winner);
    }
}

#[test]
fn concurrent_text_inserts_interleave_without_mixing() {
    let mut a = Document::with_peer(1);
    let mut b = Document::with_peer(2);
    a.get_text("text").unwrap().insert(0, "abc").unwrap();
    b.get_text("text").unwrap().insert(0, "xyz").unwrap();
    sync(&mut a, &mut b);
    sync(&mut b, &mut a);
    let merged = a.get_text("text").unwrap().to_string();
    assert_eq!(merged, b.get_text("text").unwrap().to_string());
    assert!(merged == "abcxyz" || merged == "xyzabc", "{merged}");
}

#[test]
fn counters_sum_across_replicas() {
    let mut a = Document::with_peer(1);
    let mut b = Document::with_peer(2);
    a.get_counter("c").unwrap().increment(2.0).unwrap();
    b.get_counter("c").unwrap().increment(3.5).unwrap();
    sync(&mut a, &mut b);
    sync(&mut b, &mut a);
    assert_eq!(a.to_json(), json!({"c": 5.5}));
    assert_eq!(b.to_json(), json!({"c": 5.5}));
}
