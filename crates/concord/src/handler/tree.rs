use super::check_pos;
use crate::change::OpContent;
use crate::doc::Document;
use crate::error::{DocError, Result};
use crate::fractional_index::FractionalIndex;
use crate::state::{tree_meta_id, ContainerState, Placement, TreeId, TreeParentId, TreeState};
use crate::value::{ContainerId, Value};
use crate::version::OpId;

/// Movable tree handle.
///
/// Parents are passed as `Option<TreeId>`; `None` is the root level.
pub struct TreeHandler<'a> {
    doc: &'a mut Document,
    id: ContainerId,
}

impl<'a> TreeHandler<'a> {
    pub(crate) fn new(doc: &'a mut Document, id: ContainerId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    fn state(&self) -> Result<&TreeState> {
        match self.doc.container_state(&self.id) {
            Some(ContainerState::Tree(s)) => Ok(s),
            _ => Err(DocError::ContainerNotFound(self.id.clone())),
        }
    }

    fn check_alive(&self, node: TreeId) -> Result<()> {
        let state = self.state()?;
        if !state.contains(node) {
            return Err(DocError::TreeNodeNotFound(node));
        }
        if state.is_deleted(node) {
            return Err(DocError::TreeNodeDeleted(node));
        }
        Ok(())
    }

    fn check_parent(&self, parent: Option<TreeId>) -> Result<()> {
        match parent {
            Some(p) => self.check_alive(p),
            None => Ok(()),
        }
    }

    /// Creates a node as the last child of `parent`.
    pub fn create(&mut self, parent: Option<TreeId>) -> Result<TreeId> {
        self.check_parent(parent)?;
        let index = self.children_num(parent);
        self.create_at(parent, index)
    }

    /// Creates a node at `index` among the children of `parent`.
    pub fn create_at(&mut self, parent: Option<TreeId>, index: usize) -> Result<TreeId> {
        self.check_parent(parent)?;
        check_pos(index, self.children_num(parent))?;
        let placement = self.state()?.position_for(parent.into(), index, None);
        let position = self.shift_siblings(parent, placement)?;
        self.doc
            .apply_local(&self.id, OpContent::TreeCreate { parent, position })
    }

    /// Emits the sibling moves a placement asks for and returns the key for
    /// the placed node.
    fn shift_siblings(&mut self, parent: Option<TreeId>, placement: Placement) -> Result<FractionalIndex> {
        for (target, position) in placement.rekey {
            self.doc.apply_local(
                &self.id,
                OpContent::TreeMove {
                    target,
                    parent,
                    position,
                },
            )?;
        }
        Ok(placement.position)
    }

    /// Moves `target` to the end of `parent`'s children.
    pub fn mov(&mut self, target: TreeId, parent: Option<TreeId>) -> Result<()> {
        self.check_alive(target)?;
        let index = self.siblings_without(parent, target).len();
        self.mov_to(target, parent, index)
    }

    /// Moves `target` to `index` among `parent`'s children (counted without
    /// `target` itself). Moving a node under itself or a descendant fails
    /// with [`DocError::CycleRejected`].
    pub fn mov_to(&mut self, target: TreeId, parent: Option<TreeId>, index: usize) -> Result<()> {
        self.check_alive(target)?;
        self.place(target, parent, index)
    }

    /// Puts an existing node, deleted or not, at `index` under `parent`.
    pub(crate) fn place(&mut self, target: TreeId, parent: Option<TreeId>, index: usize) -> Result<()> {
        if !self.contains(target) {
            return Err(DocError::TreeNodeNotFound(target));
        }
        self.check_parent(parent)?;
        if let Some(p) = parent {
            if self.state()?.is_ancestor_or_self(target, p) {
                return Err(DocError::CycleRejected { target, parent: p });
            }
        }
        let siblings = self.siblings_without(parent, target);
        check_pos(index, siblings.len())?;
        let state = self.state()?;
        let new_parent = TreeParentId::from(parent);
        if state.parent(target) == Some(new_parent) && state.index_of(target) == Some(index) {
            return Ok(());
        }
        let placement = state.position_for(new_parent, index, Some(target));
        let position = self.shift_siblings(parent, placement)?;
        self.doc.apply_local(
            &self.id,
            OpContent::TreeMove {
                target,
                parent,
                position,
            },
        )?;
        Ok(())
    }

    /// Moves `target` right after its new sibling `after`.
    pub fn mov_after(&mut self, target: TreeId, after: TreeId) -> Result<()> {
        let (parent, index) = self.slot_of(target, after)?;
        self.mov_to(target, parent, index + 1)
    }

    /// Moves `target` right before its new sibling `before`.
    pub fn mov_before(&mut self, target: TreeId, before: TreeId) -> Result<()> {
        let (parent, index) = self.slot_of(target, before)?;
        self.mov_to(target, parent, index)
    }

    /// Parent of `other` and its index among the siblings of `target`'s
    /// destination, not counting `target`.
    fn slot_of(&self, target: TreeId, other: TreeId) -> Result<(Option<TreeId>, usize)> {
        if target == other {
            return Err(DocError::InvalidArgument(format!(
                "cannot place {target} next to itself"
            )));
        }
        self.check_alive(target)?;
        self.check_alive(other)?;
        let parent = match self.state()?.parent(other) {
            Some(TreeParentId::Node(p)) => Some(p),
            Some(TreeParentId::Root) => None,
            _ => return Err(DocError::TreeNodeDeleted(other)),
        };
        let index = self
            .siblings_without(parent, target)
            .iter()
            .position(|n| *n == other)
            .ok_or(DocError::TreeNodeNotFound(other))?;
        Ok((parent, index))
    }

    fn siblings_without(&self, parent: Option<TreeId>, target: TreeId) -> Vec<TreeId> {
        let mut kids = self.children(parent);
        kids.retain(|n| *n != target);
        kids
    }

    /// Deletes `target` and, implicitly, its whole subtree.
    pub fn delete(&mut self, target: TreeId) -> Result<()> {
        self.check_alive(target)?;
        self.doc
            .apply_local(&self.id, OpContent::TreeDelete { target })?;
        Ok(())
    }

    pub fn parent(&self, target: TreeId) -> Option<TreeParentId> {
        self.state().ok()?.parent(target)
    }

    /// Children of `parent` in sibling order.
    pub fn children(&self, parent: impl Into<TreeParentId>) -> Vec<TreeId> {
        self.state()
            .map(|s| s.children(parent.into()))
            .unwrap_or_default()
    }

    pub fn children_num(&self, parent: impl Into<TreeParentId>) -> usize {
        self.children(parent).len()
    }

    /// Top-level nodes.
    pub fn roots(&self) -> Vec<TreeId> {
        self.children(TreeParentId::Root)
    }

    /// `true` for every node ever created, deleted or not.
    pub fn contains(&self, target: TreeId) -> bool {
        self.state().is_ok_and(|s| s.contains(target))
    }

    pub fn is_node_deleted(&self, target: TreeId) -> Result<bool> {
        let state = self.state()?;
        if !state.contains(target) {
            return Err(DocError::TreeNodeNotFound(target));
        }
        Ok(state.is_deleted(target))
    }

    /// Live nodes.
    pub fn nodes(&self) -> Vec<TreeId> {
        self.state().map(TreeState::alive_nodes).unwrap_or_default()
    }

    pub fn fractional_index(&self, target: TreeId) -> Option<String> {
        self.state()
            .ok()?
            .node(target)
            .map(|n| n.position.to_string())
    }

    /// The map container attached to `target`.
    pub fn get_meta(&self, target: TreeId) -> Result<ContainerId> {
        if !self.contains(target) {
            return Err(DocError::TreeNodeNotFound(target));
        }
        Ok(tree_meta_id(target))
    }

    /// `Some(true)` when the op was a move or create that every replica
    /// skipped because it would have created a cycle or hit a missing node.
    pub fn is_move_rejected(&self, op: OpId) -> Option<bool> {
        self.state().ok()?.is_move_effective(op).map(|effective| !effective)
    }

    pub fn get_value(&self) -> Value {
        self.doc.get_container_value(&self.id)
    }

    pub fn get_deep_value(&self) -> Value {
        self.doc.get_container_deep_value(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_child() {
        let mut doc = Document::with_peer(1);
        let mut tree = doc.get_tree("tree").unwrap();
        let root = tree.create(None).unwrap();
        let child = tree.create(Some(root)).unwrap();
        assert_eq!(tree.children(root), vec![child]);
        assert_eq!(tree.children(TreeParentId::Root), vec![root]);
        assert_eq!(tree.parent(child), Some(TreeParentId::Node(root)));
    }

    #[test]
    fn local_cycle_is_rejected() {
        let mut doc = Document::with_peer(1);
        let mut tree = doc.get_tree("tree").unwrap();
        let a = tree.create(None).unwrap();
        let b = tree.create(Some(a)).unwrap();
        assert_eq!(
            tree.mov(a, Some(b)),
            Err(DocError::CycleRejected { target: a, parent: b })
        );
        assert_eq!(
            tree.mov(a, Some(a)),
            Err(DocError::CycleRejected { target: a, parent: a })
        );
        assert_eq!(tree.parent(a), Some(TreeParentId::Root));
    }

    #[test]
    fn sibling_placement() {
        let mut doc = Document::with_peer(1);
        let mut tree = doc.get_tree("tree").unwrap();
        let a = tree.create(None).unwrap();
        let b = tree.create(None).unwrap();
        let c = tree.create(None).unwrap();
        tree.mov_before(c, a).unwrap();
        assert_eq!(tree.roots(), vec![c, a, b]);
        tree.mov_after(c, b).unwrap();
        assert_eq!(tree.roots(), vec![a, b, c]);
        let d = tree.create_at(None, 1).unwrap();
        assert_eq!(tree.roots(), vec![a, d, b, c]);
        assert!(tree.create_at(None, 9).is_err());
    }

    #[test]
    fn delete_hides_subtree() {
        let mut doc = Document::with_peer(1);
        let mut tree = doc.get_tree("tree").unwrap();
        let a = tree.create(None).unwrap();
        let b = tree.create(Some(a)).unwrap();
        tree.delete(a).unwrap();
        assert_eq!(tree.is_node_deleted(b), Ok(true));
        assert!(tree.nodes().is_empty());
        assert_eq!(tree.mov(b, None), Err(DocError::TreeNodeDeleted(b)));
        assert!(tree.contains(b));
    }

    #[test]
    fn meta_map_is_attached() {
        let mut doc = Document::with_peer(1);
        let node = doc.get_tree("tree").unwrap().create(None).unwrap();
        let meta = doc.get_tree("tree").unwrap().get_meta(node).unwrap();
        doc.get_map(&meta).unwrap().insert("title", "hello").unwrap();
        let value = doc.get_tree("tree").unwrap().get_deep_value().to_json();
        assert_eq!(value[0]["meta"], serde_json::json!({"title": "hello"}));
        assert_eq!(value[0]["parent"], serde_json::Value::Null);
    }
}
