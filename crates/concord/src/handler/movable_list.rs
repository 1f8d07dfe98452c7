use super::{check_pos, check_range, plain_value};
use crate::change::OpContent;
use crate::cursor::{Cursor, Side};
use crate::doc::Document;
use crate::error::{DocError, Result};
use crate::state::{ContainerState, MovableListState};
use crate::value::{ContainerId, ContainerType, Value};
use crate::version::OpId;

/// Movable list handle: a list whose elements keep their identity when
/// moved or overwritten.
pub struct MovableListHandler<'a> {
    doc: &'a mut Document,
    id: ContainerId,
}

impl<'a> MovableListHandler<'a> {
    pub(crate) fn new(doc: &'a mut Document, id: ContainerId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    fn state(&self) -> Option<&MovableListState> {
        match self.doc.container_state(&self.id) {
            Some(ContainerState::MovableList(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.state().map_or(0, MovableListState::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn origins(&self, pos: usize) -> (Option<OpId>, Option<OpId>) {
        self.state()
            .map_or((None, None), |s| s.positions().origins_at(pos))
    }

    fn elem_at(&self, pos: usize) -> Result<OpId> {
        let len = self.len();
        self.state()
            .and_then(|s| s.elem_at(pos))
            .ok_or(DocError::OutOfBounds { pos, len })
    }

    pub fn insert(&mut self, pos: usize, value: impl Into<Value>) -> Result<()> {
        self.insert_many(pos, vec![value.into()])
    }

    pub fn insert_many(&mut self, pos: usize, values: Vec<Value>) -> Result<()> {
        check_pos(pos, self.len())?;
        if values.is_empty() {
            return Ok(());
        }
        let values = values.into_iter().map(plain_value).collect::<Result<Vec<_>>>()?;
        let (left, right) = self.origins(pos);
        self.doc
            .apply_local(&self.id, OpContent::MovableInsert { left, right, values })?;
        Ok(())
    }

    pub fn push(&mut self, value: impl Into<Value>) -> Result<()> {
        let len = self.len();
        self.insert(len, value)
    }

    pub fn pop(&mut self) -> Result<Option<Value>> {
        let len = self.len();
        if len == 0 {
            return Ok(None);
        }
        let last = self.get(len - 1);
        self.delete(len - 1, 1)?;
        Ok(last)
    }

    pub fn insert_container(&mut self, pos: usize, container_type: ContainerType) -> Result<ContainerId> {
        check_pos(pos, self.len())?;
        let (left, right) = self.origins(pos);
        let op = self.doc.apply_local_with(&self.id, |id| OpContent::MovableInsert {
            left,
            right,
            values: vec![Value::Container(ContainerId::new_normal(id, container_type))],
        })?;
        Ok(ContainerId::new_normal(op, container_type))
    }

    pub fn delete(&mut self, pos: usize, len: usize) -> Result<()> {
        check_range(pos, len, self.len())?;
        if len == 0 {
            return Ok(());
        }
        let elems: Vec<OpId> = self
            .state()
            .map(|s| s.entries().into_iter().skip(pos).take(len).map(|e| e.elem).collect())
            .unwrap_or_default();
        self.doc
            .apply_local(&self.id, OpContent::MovableDelete { elems })?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        let len = self.len();
        self.delete(0, len)
    }

    /// Moves the element at `from` so that it ends up at index `to`.
    pub fn mov(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.len();
        if to >= len {
            return Err(DocError::OutOfBounds { pos: to, len });
        }
        let elem = self.elem_at(from)?;
        if from == to {
            return Ok(());
        }
        let (left, right) = self
            .state()
            .map_or((None, None), |s| s.move_origins(elem, to));
        self.doc
            .apply_local(&self.id, OpContent::MovableMove { elem, left, right })?;
        Ok(())
    }

    /// Overwrites the value at `pos` without changing element identity.
    pub fn set(&mut self, pos: usize, value: impl Into<Value>) -> Result<()> {
        let value = plain_value(value.into())?;
        let elem = self.elem_at(pos)?;
        if self.get(pos).as_ref() == Some(&value) {
            return Ok(());
        }
        self.doc
            .apply_local(&self.id, OpContent::MovableSet { elem, value })?;
        Ok(())
    }

    /// Replaces the value at `pos` with a new child container.
    pub fn set_container(&mut self, pos: usize, container_type: ContainerType) -> Result<ContainerId> {
        let elem = self.elem_at(pos)?;
        let op = self.doc.apply_local_with(&self.id, |id| OpContent::MovableSet {
            elem,
            value: Value::Container(ContainerId::new_normal(id, container_type)),
        })?;
        Ok(ContainerId::new_normal(op, container_type))
    }

    pub fn get(&self, pos: usize) -> Option<Value> {
        self.state()?.get(pos).cloned()
    }

    pub fn get_deep(&self, pos: usize) -> Option<Value> {
        match self.get(pos)? {
            Value::Container(child) => Some(self.doc.get_container_deep_value(&child)),
            other => Some(other),
        }
    }

    /// Element id at `pos`: the id of the insert that created it.
    pub fn get_elem_id_at(&self, pos: usize) -> Option<OpId> {
        self.state()?.elem_at(pos)
    }

    pub fn index_of_elem(&self, elem: OpId) -> Option<usize> {
        self.state()?.index_of_elem(elem)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.state().map(MovableListState::to_vec).unwrap_or_default()
    }

    pub fn get_value(&self) -> Value {
        self.doc.get_container_value(&self.id)
    }

    pub fn get_deep_value(&self) -> Value {
        self.doc.get_container_deep_value(&self.id)
    }

    pub fn get_cursor(&self, pos: usize, side: Side) -> Option<Cursor> {
        self.doc.cursor_at(&self.id, pos, side)
    }
}
