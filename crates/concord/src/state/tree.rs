//! Movable tree.
//!
//! Nodes live in a flat table keyed by `TreeId` with parent pointers. Every
//! create/move/delete is kept in a history sorted by `IdLp`; the current
//! table is the result of applying that history in order, skipping any move
//! that would make a node its own ancestor. An op arriving out of `IdLp`
//! order triggers a replay of the whole history, so every replica reaches
//! the same table and skips the same moves.

use crate::fractional_index::FractionalIndex;
use crate::version::{IdLp, OpId};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// A tree node is identified by the id of the op that created it.
pub type TreeId = OpId;

/// Parent slot of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TreeParentId {
    Node(TreeId),
    Root,
    Deleted,
}

impl From<Option<TreeId>> for TreeParentId {
    fn from(parent: Option<TreeId>) -> Self {
        parent.map_or(TreeParentId::Root, TreeParentId::Node)
    }
}

impl From<TreeId> for TreeParentId {
    fn from(node: TreeId) -> Self {
        TreeParentId::Node(node)
    }
}

impl fmt::Display for TreeParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeParentId::Node(id) => write!(f, "{id}"),
            TreeParentId::Root => f.write_str("root"),
            TreeParentId::Deleted => f.write_str("deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub parent: TreeParentId,
    pub position: FractionalIndex,
    pub last_move: OpId,
}

#[derive(Debug, Clone, PartialEq)]
struct MoveRecord {
    lp: IdLp,
    id: OpId,
    target: TreeId,
    parent: TreeParentId,
    position: FractionalIndex,
    create: bool,
    effective: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeState {
    nodes: BTreeMap<TreeId, NodeState>,
    history: Vec<MoveRecord>,
}

impl TreeState {
    /// Records a create (`create = true`, target is the op id), move or
    /// delete (`parent = Deleted`). Returns whether the op took effect in
    /// the current table.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &mut self,
        id: OpId,
        lp: IdLp,
        target: TreeId,
        parent: TreeParentId,
        position: FractionalIndex,
        create: bool,
    ) -> bool {
        let idx = match self.history.binary_search_by(|r| r.lp.cmp(&lp)) {
            Ok(_) => return self.is_move_effective(id).unwrap_or(false),
            Err(idx) => idx,
        };
        self.history.insert(
            idx,
            MoveRecord {
                lp,
                id,
                target,
                parent,
                position,
                create,
                effective: false,
            },
        );
        if idx + 1 == self.history.len() {
            self.apply_record(idx)
        } else {
            debug!(op = %id, "tree op arrived out of order, replaying history");
            self.nodes.clear();
            for i in 0..self.history.len() {
                self.apply_record(i);
            }
            self.history[idx].effective
        }
    }

    fn apply_record(&mut self, idx: usize) -> bool {
        let record = &self.history[idx];
        let exists = self.nodes.contains_key(&record.target);
        let ok = if record.create {
            !exists && self.parent_accepts(record.target, record.parent)
        } else {
            exists && self.parent_accepts(record.target, record.parent)
        };
        if ok {
            let record = &self.history[idx];
            self.nodes.insert(
                record.target,
                NodeState {
                    parent: record.parent,
                    position: record.position.clone(),
                    last_move: record.id,
                },
            );
        }
        self.history[idx].effective = ok;
        ok
    }

    /// `parent` exists and is not `target` or one of its descendants.
    fn parent_accepts(&self, target: TreeId, parent: TreeParentId) -> bool {
        match parent {
            TreeParentId::Root | TreeParentId::Deleted => true,
            TreeParentId::Node(p) => self.nodes.contains_key(&p) && !self.is_ancestor_or_self(target, p),
        }
    }

    /// `true` when `ancestor` is `node` or lies on its parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: TreeId, node: TreeId) -> bool {
        let mut cur = TreeParentId::Node(node);
        while let TreeParentId::Node(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = match self.nodes.get(&id) {
                Some(n) => n.parent,
                None => return false,
            };
        }
        false
    }

    /// Whether a recorded op took effect, `None` if unknown.
    pub fn is_move_effective(&self, id: OpId) -> Option<bool> {
        self.history.iter().find(|r| r.id == id).map(|r| r.effective)
    }

    /// Ids of recorded ops that were skipped.
    pub fn rejected_ops(&self) -> Vec<OpId> {
        self.history
            .iter()
            .filter(|r| !r.effective)
            .map(|r| r.id)
            .collect()
    }

    pub fn node(&self, id: TreeId) -> Option<&NodeState> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: TreeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn parent(&self, id: TreeId) -> Option<TreeParentId> {
        self.nodes.get(&id).map(|n| n.parent)
    }

    /// `true` when the node or one of its ancestors is deleted.
    pub fn is_deleted(&self, id: TreeId) -> bool {
        let mut cur = TreeParentId::Node(id);
        loop {
            match cur {
                TreeParentId::Node(node) => match self.nodes.get(&node) {
                    Some(n) => cur = n.parent,
                    None => return true,
                },
                TreeParentId::Root => return false,
                TreeParentId::Deleted => return true,
            }
        }
    }

    /// Children of `parent`, ordered by fractional index then node id.
    pub fn children(&self, parent: TreeParentId) -> Vec<TreeId> {
        let mut kids: Vec<(&FractionalIndex, TreeId)> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == parent)
            .map(|(id, n)| (&n.position, *id))
            .collect();
        kids.sort();
        kids.into_iter().map(|(_, id)| id).collect()
    }

    pub fn index_of(&self, id: TreeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Live (not deleted) nodes in id order.
    pub fn alive_nodes(&self) -> Vec<TreeId> {
        self.nodes
            .keys()
            .copied()
            .filter(|id| !self.is_deleted(*id))
            .collect()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = (&TreeId, &NodeState)> + '_ {
        self.nodes.iter()
    }

    /// Keys placing a node at `index` among the children of `parent`,
    /// ignoring `moving` itself.
    ///
    /// Concurrent inserts into one slot leave siblings with equal keys, and
    /// no key fits between two equal keys. In that case the siblings from
    /// `index` up to the next larger key get fresh keys after the new one.
    pub fn position_for(
        &self,
        parent: TreeParentId,
        index: usize,
        moving: Option<TreeId>,
    ) -> Placement {
        let siblings: Vec<TreeId> = self
            .children(parent)
            .into_iter()
            .filter(|id| Some(*id) != moving)
            .collect();
        let key = |i: usize| siblings.get(i).and_then(|id| self.nodes.get(id)).map(|n| &n.position);
        let lo = index.checked_sub(1).and_then(key);
        let hi = key(index);
        match (lo, hi) {
            (Some(l), Some(h)) if l >= h => {
                let end = (index..siblings.len())
                    .find(|&i| key(i).is_some_and(|k| k > l))
                    .unwrap_or(siblings.len());
                let mut keys =
                    FractionalIndex::generate_n(Some(l), key(end), end - index + 1).into_iter();
                let position = keys
                    .next()
                    .unwrap_or_else(|| FractionalIndex::between(Some(l), None));
                let rekey = siblings[index..end].iter().copied().zip(keys).collect();
                Placement { position, rekey }
            }
            _ => Placement {
                position: FractionalIndex::between(lo, hi),
                rekey: Vec::new(),
            },
        }
    }
}

/// Result of [`TreeState::position_for`].
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub position: FractionalIndex,
    /// Siblings to move to new keys, in order, before placing the node.
    pub rekey: Vec<(TreeId, FractionalIndex)>,
}
