//! Materialized container states and the registry that folds ops into them.

mod counter;
mod list;
mod map;
mod movable_list;
pub(crate) mod sequence;
mod text;
mod tree;

pub use counter::CounterState;
pub use list::ListState;
pub use map::{MapEntry, MapState};
pub use movable_list::{Element, MovableEntry, MovableListState};
pub use text::{StyleMark, StyledChar, TextState};
pub use tree::{NodeState, Placement, TreeId, TreeParentId, TreeState};

use crate::change::{Op, OpContent};
use crate::fractional_index::FractionalIndex;
use crate::value::{ContainerId, ContainerType, Index, Value};
use crate::version::{Frontiers, IdLp, Lamport, OpId, PeerId};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use tracing::trace;

/// State of one container, tagged by type.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerState {
    Text(TextState),
    Map(MapState),
    List(ListState),
    MovableList(MovableListState),
    Tree(TreeState),
    Counter(CounterState),
}

impl ContainerState {
    pub fn new(container_type: ContainerType) -> Self {
        match container_type {
            ContainerType::Text => ContainerState::Text(TextState::default()),
            ContainerType::Map => ContainerState::Map(MapState::default()),
            ContainerType::List => ContainerState::List(ListState::default()),
            ContainerType::MovableList => ContainerState::MovableList(MovableListState::default()),
            ContainerType::Tree => ContainerState::Tree(TreeState::default()),
            ContainerType::Counter => ContainerState::Counter(CounterState::default()),
        }
    }

    /// `true` when the container shows no content.
    pub fn is_empty(&self) -> bool {
        match self {
            ContainerState::Text(s) => s.is_empty(),
            ContainerState::Map(s) => s.is_empty(),
            ContainerState::List(s) => s.is_empty(),
            ContainerState::MovableList(s) => s.is_empty(),
            ContainerState::Tree(s) => s.alive_nodes().is_empty(),
            ContainerState::Counter(s) => s.is_empty(),
        }
    }

    pub fn container_type(&self) -> ContainerType {
        match self {
            ContainerState::Text(_) => ContainerType::Text,
            ContainerState::Map(_) => ContainerType::Map,
            ContainerState::List(_) => ContainerType::List,
            ContainerState::MovableList(_) => ContainerType::MovableList,
            ContainerState::Tree(_) => ContainerType::Tree,
            ContainerState::Counter(_) => ContainerType::Counter,
        }
    }
}

/// How [`DocState::apply_op`] folds an op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyMode {
    /// Normal integration.
    Apply,
    /// The op is being reverted: inserted items are integrated as
    /// tombstones and move items as inert positions, so later ops can still
    /// address them; everything else is skipped.
    Revert,
}

/// Id of the meta map attached to a tree node.
pub fn tree_meta_id(node: TreeId) -> ContainerId {
    ContainerId::new_normal(node, ContainerType::Map)
}

/// Every container of a document plus the parent links of nested ones.
#[derive(Debug, Clone, Default)]
pub struct DocState {
    containers: IndexMap<ContainerId, ContainerState>,
    /// Root name → every type seen under it, with the lowest `IdLp` of an
    /// op applied to that root (`None` while only requested locally).
    roots: BTreeMap<String, BTreeMap<ContainerType, Option<IdLp>>>,
    parents: BTreeMap<ContainerId, ContainerId>,
    frontiers: Frontiers,
}

impl DocState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frontiers(&self) -> &Frontiers {
        &self.frontiers
    }

    pub(crate) fn set_frontiers(&mut self, frontiers: Frontiers) {
        self.frontiers = frontiers;
    }

    pub fn get(&self, id: &ContainerId) -> Option<&ContainerState> {
        self.containers.get(id)
    }

    pub fn contains(&self, id: &ContainerId) -> bool {
        self.containers.contains_key(id)
    }

    /// Type of the root container registered under `name`.
    ///
    /// When replicas used one name with several types, the type whose
    /// earliest op has the lowest `IdLp` wins, so every replica holding the
    /// same ops answers the same.
    pub fn root_type(&self, name: &str) -> Option<ContainerType> {
        let slots = self.roots.get(name)?;
        slots
            .iter()
            .filter_map(|(ty, lp)| lp.map(|lp| (lp, *ty)))
            .min_by_key(|(lp, _)| *lp)
            .map(|(_, ty)| ty)
            .or_else(|| slots.keys().next().copied())
    }

    fn touch_root(&mut self, id: &ContainerId, lp: Option<IdLp>) {
        let ContainerId::Root {
            name,
            container_type,
        } = id
        else {
            return;
        };
        let slot = self
            .roots
            .entry(name.clone())
            .or_default()
            .entry(*container_type)
            .or_insert(lp);
        if let Some(lp) = lp {
            *slot = Some(slot.map_or(lp, |prev| prev.min(lp)));
        }
    }

    pub fn container_ids(&self) -> impl Iterator<Item = &ContainerId> + '_ {
        self.containers.keys()
    }

    pub fn parent_of(&self, id: &ContainerId) -> Option<&ContainerId> {
        self.parents.get(id)
    }

    pub(crate) fn get_or_create(&mut self, id: &ContainerId) -> &mut ContainerState {
        self.touch_root(id, None);
        self.containers
            .entry(id.clone())
            .or_insert_with(|| ContainerState::new(id.container_type()))
    }

    fn register_child(&mut self, parent: &ContainerId, child: &ContainerId) {
        if child.is_root() {
            return;
        }
        self.parents.entry(child.clone()).or_insert_with(|| parent.clone());
        self.get_or_create(child);
    }

    /// Folds one op. `lamport` is the Lamport timestamp of the op's first
    /// atom and `peer` its author.
    pub(crate) fn apply_op(&mut self, op: &Op, peer: PeerId, lamport: Lamport, mode: ApplyMode) {
        let id = OpId::new(peer, op.counter);
        let lp = IdLp::new(lamport, peer);
        let revert = mode == ApplyMode::Revert;
        trace!(op = %op, revert, "apply op");
        if !revert {
            for value in op.content.values() {
                if let Value::Container(child) = value {
                    let container = op.container.clone();
                    self.register_child(&container, child);
                }
            }
        }
        if let OpContent::TreeCreate { .. } = op.content {
            if !revert {
                let container = op.container.clone();
                self.register_child(&container, &tree_meta_id(id));
            }
        }
        self.touch_root(&op.container, Some(lp));
        let state = self.get_or_create(&op.container);
        match (&op.content, state) {
            (OpContent::TextInsert { left, right, text }, ContainerState::Text(s)) => {
                s.insert(id, *left, *right, text, revert)
            }
            (OpContent::TextDelete { targets }, ContainerState::Text(s)) if !revert => {
                for span in targets {
                    for target in span.iter() {
                        s.delete(target);
                    }
                }
            }
            (
                OpContent::TextMark {
                    start,
                    end,
                    key,
                    value,
                },
                ContainerState::Text(s),
            ) if !revert => s.mark(StyleMark {
                lp,
                start: *start,
                end: *end,
                key: key.clone(),
                value: value.clone(),
            }),
            (OpContent::MapSet { key, value }, ContainerState::Map(s)) if !revert => {
                s.set(key, value.clone(), lp);
            }
            (OpContent::ListInsert { left, right, values }, ContainerState::List(s)) => {
                s.insert(id, *left, *right, values, revert)
            }
            (OpContent::ListDelete { targets }, ContainerState::List(s)) if !revert => {
                for span in targets {
                    for target in span.iter() {
                        s.delete(target);
                    }
                }
            }
            (OpContent::MovableInsert { left, right, values }, ContainerState::MovableList(s)) => {
                s.insert(id, lamport, *left, *right, values, revert)
            }
            (OpContent::MovableMove { elem, left, right }, ContainerState::MovableList(s)) => {
                s.mov(id, lp, *elem, *left, *right, !revert);
            }
            (OpContent::MovableSet { elem, value }, ContainerState::MovableList(s)) if !revert => {
                s.set(*elem, value.clone(), lp);
            }
            (OpContent::MovableDelete { elems }, ContainerState::MovableList(s)) if !revert => {
                for elem in elems {
                    s.delete(*elem);
                }
            }
            (OpContent::TreeCreate { parent, position }, ContainerState::Tree(s)) if !revert => {
                s.apply(id, lp, id, (*parent).into(), position.clone(), true);
            }
            (
                OpContent::TreeMove {
                    target,
                    parent,
                    position,
                },
                ContainerState::Tree(s),
            ) if !revert => {
                s.apply(id, lp, *target, (*parent).into(), position.clone(), false);
            }
            (OpContent::TreeDelete { target }, ContainerState::Tree(s)) if !revert => {
                s.apply(
                    id,
                    lp,
                    *target,
                    TreeParentId::Deleted,
                    FractionalIndex::default(),
                    false,
                );
            }
            (OpContent::CounterIncrement { delta }, ContainerState::Counter(s)) if !revert => {
                s.apply(id, *delta)
            }
            _ => {}
        }
    }

    /// Shallow value of a container: nested containers stay links.
    pub fn get_value(&self, id: &ContainerId) -> Value {
        self.value_of(id, false)
    }

    /// Deep value of a container: nested containers are materialized.
    pub fn get_deep_value(&self, id: &ContainerId) -> Value {
        self.value_of(id, true)
    }

    fn resolve(&self, value: &Value, deep: bool) -> Value {
        match value {
            Value::Container(child) if deep => self.value_of(child, true),
            other => other.clone(),
        }
    }

    fn value_of(&self, id: &ContainerId, deep: bool) -> Value {
        let Some(state) = self.containers.get(id) else {
            return id.container_type().empty_value();
        };
        match state {
            ContainerState::Text(s) => Value::String(s.to_string()),
            ContainerState::Map(s) => Value::Map(
                s.iter()
                    .map(|(k, v)| (k.clone(), self.resolve(v, deep)))
                    .collect(),
            ),
            ContainerState::List(s) => {
                Value::List(s.to_vec().iter().map(|v| self.resolve(v, deep)).collect())
            }
            ContainerState::MovableList(s) => {
                Value::List(s.to_vec().iter().map(|v| self.resolve(v, deep)).collect())
            }
            ContainerState::Tree(s) => Value::List(
                s.children(TreeParentId::Root)
                    .into_iter()
                    .map(|node| self.tree_node_value(s, node, deep))
                    .collect(),
            ),
            ContainerState::Counter(s) => Value::Double(s.value()),
        }
    }

    fn tree_node_value(&self, tree: &TreeState, node: TreeId, deep: bool) -> Value {
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), Value::String(node.to_string()));
        let (parent, position) = match tree.node(node) {
            Some(n) => (n.parent, n.position.to_string()),
            None => (TreeParentId::Root, String::new()),
        };
        map.insert(
            "parent".to_string(),
            match parent {
                TreeParentId::Node(p) => Value::String(p.to_string()),
                _ => Value::Null,
            },
        );
        map.insert(
            "index".to_string(),
            Value::I64(tree.index_of(node).unwrap_or(0) as i64),
        );
        map.insert("fractional_index".to_string(), Value::String(position));
        let meta = tree_meta_id(node);
        map.insert(
            "meta".to_string(),
            if deep {
                self.value_of(&meta, true)
            } else {
                Value::Container(meta)
            },
        );
        map.insert(
            "children".to_string(),
            Value::List(
                tree.children(TreeParentId::Node(node))
                    .into_iter()
                    .map(|child| self.tree_node_value(tree, child, deep))
                    .collect(),
            ),
        );
        Value::Map(map)
    }

    /// Root name → value for every root container with content.
    pub fn roots_value(&self, deep: bool) -> Value {
        Value::Map(
            self.roots
                .keys()
                .filter_map(|name| Some((name, self.root_type(name)?)))
                .filter(|(name, ty)| {
                    self.containers
                        .get(&ContainerId::new_root(name.as_str(), *ty))
                        .is_some_and(|s| !s.is_empty())
                })
                .map(|(name, ty)| {
                    let id = ContainerId::new_root(name, ty);
                    let value = if deep {
                        self.value_of(&id, true)
                    } else {
                        Value::Container(id)
                    };
                    (name.clone(), value)
                })
                .collect(),
        )
    }

    /// Index of `child` inside its parent container, `None` when the link
    /// was overwritten or deleted.
    fn index_in_parent(&self, parent: &ContainerId, child: &ContainerId) -> Option<Index> {
        let is_child = |v: &Value| v.as_container() == Some(child);
        match self.containers.get(parent)? {
            ContainerState::Map(s) => s
                .iter()
                .find(|(_, v)| is_child(v))
                .map(|(k, _)| Index::Key(k.clone())),
            ContainerState::List(s) => s.to_vec().iter().position(is_child).map(Index::Seq),
            ContainerState::MovableList(s) => {
                s.to_vec().iter().position(is_child).map(Index::Seq)
            }
            ContainerState::Tree(s) => {
                let node = child.op_id()?;
                (s.contains(node) && !s.is_deleted(node)).then_some(Index::Node(node))
            }
            ContainerState::Text(_) | ContainerState::Counter(_) => None,
        }
    }

    /// Path from a root down to `id`: each step is a container and the
    /// index of the next container inside it. Empty for a root.
    pub fn path_to(&self, id: &ContainerId) -> Option<Vec<(ContainerId, Index)>> {
        let mut path = Vec::new();
        let mut cur = id.clone();
        while !cur.is_root() {
            let parent = self.parents.get(&cur)?;
            let index = self.index_in_parent(parent, &cur)?;
            path.push((parent.clone(), index));
            cur = parent.clone();
        }
        path.reverse();
        Some(path)
    }

    /// `true` when the container is reachable from a root.
    pub fn is_attached(&self, id: &ContainerId) -> bool {
        self.path_to(id).is_some()
    }
}
