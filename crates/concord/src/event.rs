//! Change events delivered to subscribers.
//!
//! Events are computed by diffing a snapshot of each touched container
//! taken before a commit or import against its state afterwards, so the
//! delta reflects exactly what a subscriber could observe.

use crate::state::{ContainerState, StyledChar, TreeParentId, TreeState};
use crate::value::{ContainerId, Index, Value};
use crate::version::OpId;
use concord_util::diff::{diff, DiffOp};
use std::collections::{BTreeMap, BTreeSet};

/// Style attributes of a text span.
pub type Attributes = BTreeMap<String, Value>;

/// One segment of a rich-text delta.
#[derive(Debug, Clone, PartialEq)]
pub enum TextDelta {
    /// Keep `retain` chars; `attributes` lists the keys whose value changed
    /// (`Null` for a removed key).
    Retain {
        retain: usize,
        attributes: Option<Attributes>,
    },
    Insert {
        insert: String,
        attributes: Option<Attributes>,
    },
    Delete {
        delete: usize,
    },
}

impl TextDelta {
    /// Quill-style JSON: `{"insert": "..", "attributes": {..}}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        let attributes = match self {
            TextDelta::Retain { retain, attributes } => {
                obj.insert("retain".into(), (*retain).into());
                attributes
            }
            TextDelta::Insert { insert, attributes } => {
                obj.insert("insert".into(), insert.clone().into());
                attributes
            }
            TextDelta::Delete { delete } => {
                obj.insert("delete".into(), (*delete).into());
                &None
            }
        };
        if let Some(attrs) = attributes {
            obj.insert(
                "attributes".into(),
                serde_json::Value::Object(attrs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            );
        }
        serde_json::Value::Object(obj)
    }

    /// Parses one Quill-style segment; `None` when it has no known verb.
    pub fn from_json(json: &serde_json::Value) -> Option<TextDelta> {
        let obj = json.as_object()?;
        let attributes = obj.get("attributes").and_then(|a| a.as_object()).map(|a| {
            a.iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect::<Attributes>()
        });
        if let Some(insert) = obj.get("insert").and_then(|v| v.as_str()) {
            return Some(TextDelta::Insert {
                insert: insert.to_string(),
                attributes,
            });
        }
        if let Some(retain) = obj.get("retain").and_then(|v| v.as_u64()) {
            return Some(TextDelta::Retain {
                retain: retain as usize,
                attributes,
            });
        }
        obj.get("delete")
            .and_then(|v| v.as_u64())
            .map(|delete| TextDelta::Delete {
                delete: delete as usize,
            })
    }
}

/// One segment of a list delta.
#[derive(Debug, Clone, PartialEq)]
pub enum ListDiffItem {
    /// `is_move` marks elements of a movable list that already existed and
    /// only changed position.
    Insert { values: Vec<Value>, is_move: bool },
    Delete { len: usize },
    Retain { len: usize },
}

/// Keys whose visible value changed; `None` means deleted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapDelta {
    pub updated: BTreeMap<String, Option<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeExternalDiff {
    Create {
        parent: TreeParentId,
        index: usize,
    },
    Move {
        parent: TreeParentId,
        index: usize,
        old_parent: TreeParentId,
        old_index: usize,
    },
    Delete {
        old_parent: TreeParentId,
        old_index: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeDiffItem {
    pub target: OpId,
    pub action: TreeExternalDiff,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeDiff {
    pub diff: Vec<TreeDiffItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    Text(Vec<TextDelta>),
    List(Vec<ListDiffItem>),
    Map(MapDelta),
    Tree(TreeDiff),
    /// Change of the counter value.
    Counter(f64),
}

/// The delta of one container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDiff {
    pub target: ContainerId,
    /// Steps from a root container down to `target`; each step is a
    /// container and the index of the next one inside it.
    pub path: Vec<(ContainerId, Index)>,
    pub diff: Diff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTriggerKind {
    /// A local commit.
    Local,
    /// An import or applied diff.
    Import,
}

/// What subscribers receive after a commit or import.
#[derive(Debug, Clone, PartialEq)]
pub struct DocEvent {
    pub triggered_by: EventTriggerKind,
    pub origin: String,
    /// The container a per-container subscription was registered on.
    pub current_target: Option<ContainerId>,
    pub events: Vec<ContainerDiff>,
}

/// Observable content of one container, as far as events are concerned.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ContainerSnapshot {
    Text(Vec<StyledChar>),
    List(Vec<(OpId, Value)>),
    MovableList(Vec<(OpId, Value)>),
    Map(BTreeMap<String, Value>),
    Tree(Vec<TreeNodeSnapshot>),
    Counter(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TreeNodeSnapshot {
    pub id: OpId,
    pub parent: TreeParentId,
    pub index: usize,
}

impl ContainerSnapshot {
    pub(crate) fn take(state: &ContainerState) -> Self {
        match state {
            ContainerState::Text(s) => ContainerSnapshot::Text(s.styled_chars()),
            ContainerState::List(s) => ContainerSnapshot::List(s.entries()),
            ContainerState::MovableList(s) => ContainerSnapshot::MovableList(
                s.entries().into_iter().map(|e| (e.elem, e.value)).collect(),
            ),
            ContainerState::Map(s) => ContainerSnapshot::Map(s.to_map()),
            ContainerState::Tree(s) => ContainerSnapshot::Tree(tree_snapshot(s)),
            ContainerState::Counter(s) => ContainerSnapshot::Counter(s.value()),
        }
    }

    /// Snapshot of a container that did not exist yet.
    pub(crate) fn empty_like(state: &ContainerState) -> Self {
        match state {
            ContainerState::Text(_) => ContainerSnapshot::Text(Vec::new()),
            ContainerState::List(_) => ContainerSnapshot::List(Vec::new()),
            ContainerState::MovableList(_) => ContainerSnapshot::MovableList(Vec::new()),
            ContainerState::Map(_) => ContainerSnapshot::Map(BTreeMap::new()),
            ContainerState::Tree(_) => ContainerSnapshot::Tree(Vec::new()),
            ContainerState::Counter(_) => ContainerSnapshot::Counter(0.0),
        }
    }

    /// The delta turning `self` into `after`, `None` when nothing visible
    /// changed.
    pub(crate) fn diff(&self, after: &ContainerSnapshot) -> Option<Diff> {
        let diff = match (self, after) {
            (ContainerSnapshot::Text(a), ContainerSnapshot::Text(b)) => {
                let delta = text_diff(a, b);
                (!delta.is_empty()).then_some(Diff::Text(delta))?
            }
            (ContainerSnapshot::List(a), ContainerSnapshot::List(b)) => {
                let delta = list_diff(a, b, false);
                (!delta.is_empty()).then_some(Diff::List(delta))?
            }
            (ContainerSnapshot::MovableList(a), ContainerSnapshot::MovableList(b)) => {
                let delta = list_diff(a, b, true);
                (!delta.is_empty()).then_some(Diff::List(delta))?
            }
            (ContainerSnapshot::Map(a), ContainerSnapshot::Map(b)) => {
                let delta = map_diff(a, b);
                (!delta.updated.is_empty()).then_some(Diff::Map(delta))?
            }
            (ContainerSnapshot::Tree(a), ContainerSnapshot::Tree(b)) => {
                let delta = tree_diff(a, b);
                (!delta.diff.is_empty()).then_some(Diff::Tree(delta))?
            }
            (ContainerSnapshot::Counter(a), ContainerSnapshot::Counter(b)) => {
                (a != b).then_some(Diff::Counter(b - a))?
            }
            _ => return None,
        };
        Some(diff)
    }
}

fn tree_snapshot(tree: &TreeState) -> Vec<TreeNodeSnapshot> {
    // Depth-first from the roots so parents precede their children.
    let mut out = Vec::new();
    let mut stack: Vec<(TreeParentId, usize, OpId)> = tree
        .children(TreeParentId::Root)
        .into_iter()
        .enumerate()
        .rev()
        .map(|(i, id)| (TreeParentId::Root, i, id))
        .collect();
    while let Some((parent, index, id)) = stack.pop() {
        out.push(TreeNodeSnapshot { id, parent, index });
        let kids = tree.children(TreeParentId::Node(id));
        stack.extend(
            kids.into_iter()
                .enumerate()
                .rev()
                .map(|(i, kid)| (TreeParentId::Node(id), i, kid)),
        );
    }
    out
}

fn push_insert(out: &mut Vec<TextDelta>, ch: char, attrs: &Attributes) {
    let attrs = (!attrs.is_empty()).then(|| attrs.clone());
    match out.last_mut() {
        Some(TextDelta::Insert { insert, attributes }) if *attributes == attrs => insert.push(ch),
        _ => out.push(TextDelta::Insert {
            insert: ch.to_string(),
            attributes: attrs,
        }),
    }
}

fn push_retain(out: &mut Vec<TextDelta>, len: usize, attrs: Option<Attributes>) {
    match out.last_mut() {
        Some(TextDelta::Retain { retain, attributes }) if *attributes == attrs => *retain += len,
        _ => out.push(TextDelta::Retain {
            retain: len,
            attributes: attrs,
        }),
    }
}

fn push_delete(out: &mut Vec<TextDelta>, len: usize) {
    match out.last_mut() {
        Some(TextDelta::Delete { delete }) => *delete += len,
        _ => out.push(TextDelta::Delete { delete: len }),
    }
}

/// Attribute keys whose value differs, `Null` for removed keys.
fn attribute_change(old: &Attributes, new: &Attributes) -> Option<Attributes> {
    let mut changed = Attributes::new();
    for (k, v) in new {
        if old.get(k) != Some(v) {
            changed.insert(k.clone(), v.clone());
        }
    }
    for k in old.keys() {
        if !new.contains_key(k) {
            changed.insert(k.clone(), Value::Null);
        }
    }
    (!changed.is_empty()).then_some(changed)
}

fn text_diff(old: &[StyledChar], new: &[StyledChar]) -> Vec<TextDelta> {
    let old_ids: Vec<OpId> = old.iter().map(|c| c.id).collect();
    let new_ids: Vec<OpId> = new.iter().map(|c| c.id).collect();
    let mut out = Vec::new();
    for op in diff(&old_ids, &new_ids) {
        match op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => {
                for i in 0..len {
                    let change = attribute_change(
                        &old[old_index + i].attributes,
                        &new[new_index + i].attributes,
                    );
                    push_retain(&mut out, 1, change);
                }
            }
            DiffOp::Delete { old_len, .. } => push_delete(&mut out, old_len),
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                for c in &new[new_index..new_index + new_len] {
                    push_insert(&mut out, c.ch, &c.attributes);
                }
            }
        }
    }
    if let Some(TextDelta::Retain {
        attributes: None, ..
    }) = out.last()
    {
        out.pop();
    }
    out
}

fn list_diff(old: &[(OpId, Value)], new: &[(OpId, Value)], movable: bool) -> Vec<ListDiffItem> {
    let old_ids: Vec<OpId> = old.iter().map(|(id, _)| *id).collect();
    let new_ids: Vec<OpId> = new.iter().map(|(id, _)| *id).collect();
    let existed: BTreeSet<OpId> = if movable {
        old_ids.iter().copied().collect()
    } else {
        BTreeSet::new()
    };
    let mut out: Vec<ListDiffItem> = Vec::new();
    let mut push = |item: ListDiffItem| {
        match (out.last_mut(), &item) {
            (Some(ListDiffItem::Retain { len }), ListDiffItem::Retain { len: more }) => *len += more,
            (Some(ListDiffItem::Delete { len }), ListDiffItem::Delete { len: more }) => *len += more,
            (
                Some(ListDiffItem::Insert { values, is_move }),
                ListDiffItem::Insert {
                    values: more,
                    is_move: more_move,
                },
            ) if is_move == more_move => values.extend(more.iter().cloned()),
            _ => out.push(item),
        }
    };
    for op in diff(&old_ids, &new_ids) {
        match op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => {
                for i in 0..len {
                    let (_, before) = &old[old_index + i];
                    let (_, after) = &new[new_index + i];
                    if before == after {
                        push(ListDiffItem::Retain { len: 1 });
                    } else {
                        push(ListDiffItem::Delete { len: 1 });
                        push(ListDiffItem::Insert {
                            values: vec![after.clone()],
                            is_move: false,
                        });
                    }
                }
            }
            DiffOp::Delete { old_len, .. } => push(ListDiffItem::Delete { len: old_len }),
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                for (id, value) in &new[new_index..new_index + new_len] {
                    push(ListDiffItem::Insert {
                        values: vec![value.clone()],
                        is_move: existed.contains(id),
                    });
                }
            }
        }
    }
    if let Some(ListDiffItem::Retain { .. }) = out.last() {
        out.pop();
    }
    out
}

fn map_diff(old: &BTreeMap<String, Value>, new: &BTreeMap<String, Value>) -> MapDelta {
    let mut updated = BTreeMap::new();
    for (k, v) in new {
        if old.get(k) != Some(v) {
            updated.insert(k.clone(), Some(v.clone()));
        }
    }
    for k in old.keys() {
        if !new.contains_key(k) {
            updated.insert(k.clone(), None);
        }
    }
    MapDelta { updated }
}

fn tree_diff(old: &[TreeNodeSnapshot], new: &[TreeNodeSnapshot]) -> TreeDiff {
    let before: BTreeMap<OpId, &TreeNodeSnapshot> = old.iter().map(|n| (n.id, n)).collect();
    let after: BTreeSet<OpId> = new.iter().map(|n| n.id).collect();
    let mut diff = Vec::new();
    for node in new {
        let action = match before.get(&node.id) {
            None => TreeExternalDiff::Create {
                parent: node.parent,
                index: node.index,
            },
            Some(prev) if prev.parent != node.parent || prev.index != node.index => {
                TreeExternalDiff::Move {
                    parent: node.parent,
                    index: node.index,
                    old_parent: prev.parent,
                    old_index: prev.index,
                }
            }
            Some(_) => continue,
        };
        diff.push(TreeDiffItem {
            target: node.id,
            action,
        });
    }
    // Children before parents so indexes stay meaningful while replaying.
    for node in old.iter().rev() {
        if !after.contains(&node.id) {
            diff.push(TreeDiffItem {
                target: node.id,
                action: TreeExternalDiff::Delete {
                    old_parent: node.parent,
                    old_index: node.index,
                },
            });
        }
    }
    TreeDiff { diff }
}
