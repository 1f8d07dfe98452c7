use crate::helpers::sync;
use concord::{DocError, Document, TreeId, TreeParentId};

fn two_roots() -> (Document, Document, TreeId, TreeId) {
    let mut a = Document::with_peer(1);
    let (x, y) = {
        let mut tree = a.get_tree("tree").unwrap();
        (tree.create(None).unwrap(), tree.create(None).unwrap())
    };
    a.commit();
    let mut b = Document::with_peer(2);
    sync(&mut a, &mut b);
    (a, b, x, y)
}

/// Parent chain of every live node ends at the root level.
fn assert_acyclic(doc: &mut Document) {
    let tree = doc.get_tree("tree").unwrap();
    let nodes = tree.nodes();
    for node in &nodes {
        let mut cur = *node;
        let mut steps = 0;
        while let Some(TreeParentId::Node(parent)) = tree.parent(cur) {
            cur = parent;
            steps += 1;
            assert!(steps <= nodes.len(), "cycle through {node}");
        }
    }
}

#[test]
fn concurrent_moves_never_form_a_cycle() {
    let (mut a, mut b, x, y) = two_roots();
    a.get_tree("tree").unwrap().mov(x, Some(y)).unwrap();
    b.get_tree("tree").unwrap().mov(y, Some(x)).unwrap();
    sync(&mut a, &mut b);
    sync(&mut b, &mut a);

    assert_acyclic(&mut a);
    assert_acyclic(&mut b);
    assert_eq!(
        a.get_tree("tree").unwrap().get_deep_value(),
        b.get_tree("tree").unwrap().get_deep_value()
    );
    let tree = a.get_tree("tree").unwrap();
    assert_eq!(tree.roots().len(), 1);
    let root = tree.roots()[0];
    let other = if root == x { y } else { x };
    assert_eq!(tree.parent(other), Some(TreeParentId::Node(root)));
}

#[test]
fn three_way_rotation_stays_acyclic() {
    let mut a = Document::with_peer(1);
    let (x, y, z) = {
        let mut tree = a.get_tree("tree").unwrap();
        (
            tree.create(None).unwrap(),
            tree.create(None).unwrap(),
            tree.create(None).unwrap(),
        )
    };
    a.commit();
    let mut b = Document::with_peer(2);
    let mut c = Document::with_peer(3);
    sync(&mut a, &mut b);
    sync(&mut a, &mut c);
    a.get_tree("tree").unwrap().mov(x, Some(y)).unwrap();
    b.get_tree("tree").unwrap().mov(y, Some(z)).unwrap();
    c.get_tree("tree").unwrap().mov(z, Some(x)).unwrap();
    let mut docs = vec![a, b, c];
    crate::helpers::sync_all(&mut docs);
    let expected = docs[0].get_tree("tree").unwrap().get_deep_value();
    for doc in &mut docs {
        assert_acyclic(doc);
        assert_eq!(doc.get_tree("tree").unwrap().get_deep_value(), expected);
    }
}

#[test]
fn move_under_concurrently_deleted_parent_hides_the_node() {
    let (mut a, mut b, x, y) = two_roots();
    a.get_tree("tree").unwrap().delete(y).unwrap();
    b.get_tree("tree").unwrap().mov(x, Some(y)).unwrap();
    sync(&mut a, &mut b);
    sync(&mut b, &mut a);
    for doc in [&mut a, &mut b] {
        let tree = doc.get_tree("tree").unwrap();
        assert_eq!(tree.is_node_deleted(x), Ok(true));
        assert!(tree.nodes().is_empty());
    }
}

#[test]
fn local_cycle_is_reported() {
    let mut doc = Document::with_peer(1);
    let mut tree = doc.get_tree("tree").unwrap();
    let parent = tree.create(None).unwrap();
    let child = tree.create(Some(parent)).unwrap();
    let grandchild = tree.create(Some(child)).unwrap();
    assert_eq!(
        tree.mov(parent, Some(grandchild)),
        Err(DocError::CycleRejected {
            target: parent,
            parent: grandchild
        })
    );
    assert_eq!(tree.roots(), vec![parent]);
}

#[test]
fn sibling_order_is_shared() {
    let (mut a, mut b, x, y) = two_roots();
    let from_a = a.get_tree("tree").unwrap().create_at(None, 1).unwrap();
    let from_b = b.get_tree("tree").unwrap().create_at(None, 1).unwrap();
    sync(&mut a, &mut b);
    sync(&mut b, &mut a);
    let roots = a.get_tree("tree").unwrap().roots();
    assert_eq!(roots, b.get_tree("tree").unwrap().roots());
    assert_eq!(roots.len(), 4);
    assert_eq!(roots.first(), Some(&x));
    assert_eq!(roots.last(), Some(&y));
    assert!(roots.contains(&from_a) && roots.contains(&from_b));
}

fn zero_positions(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if key == "position" {
                    *v = serde_json::json!([0]);
                } else {
                    zero_positions(v);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(zero_positions),
        _ => {}
    }
}

#[test]
fn zero_terminated_position_is_rejected_on_import() {
    let mut a = Document::with_peer(9);
    a.get_tree("tree").unwrap().create(None).unwrap();
    a.commit();
    let to = a.oplog_vv().clone();
    let json = a
        .export_json_updates(&concord::VersionVector::new(), &to)
        .unwrap();
    let mut crafted: serde_json::Value = serde_json::from_str(&json).unwrap();
    zero_positions(&mut crafted);

    let mut b = Document::with_peer(2);
    assert!(matches!(
        b.import_json_updates(&crafted.to_string()),
        Err(DocError::Decode(_))
    ));
    assert!(b.oplog_vv().is_empty());
    let mut tree = b.get_tree("tree").unwrap();
    let first = tree.create_at(None, 0).unwrap();
    let second = tree.create_at(None, 0).unwrap();
    assert_eq!(tree.roots(), vec![second, first]);
}

#[test]
fn create_at_lands_between_concurrent_siblings() {
    let mut a = Document::with_peer(1);
    let mut b = Document::with_peer(2);
    let x = a.get_tree("tree").unwrap().create(None).unwrap();
    let y = b.get_tree("tree").unwrap().create(None).unwrap();
    sync(&mut a, &mut b);
    sync(&mut b, &mut a);
    assert_eq!(a.get_tree("tree").unwrap().roots(), vec![x, y]);

    let mid = a.get_tree("tree").unwrap().create_at(None, 1).unwrap();
    assert_eq!(a.get_tree("tree").unwrap().roots(), vec![x, mid, y]);
    let z = a.get_tree("tree").unwrap().create(None).unwrap();
    a.get_tree("tree").unwrap().mov_before(z, y).unwrap();
    assert_eq!(a.get_tree("tree").unwrap().roots(), vec![x, mid, z, y]);
    sync(&mut a, &mut b);
    assert_eq!(
        b.get_tree("tree").unwrap().roots(),
        a.get_tree("tree").unwrap().roots()
    );
}
