use super::{check_pos, check_range, plain_value};
use crate::change::OpContent;
use crate::cursor::{Cursor, Side};
use crate::doc::Document;
use crate::error::Result;
use crate::state::{ContainerState, ListState};
use crate::value::{ContainerId, ContainerType, Value};
use crate::version::{ids_to_spans, OpId};

/// Plain list handle.
pub struct ListHandler<'a> {
    doc: &'a mut Document,
    id: ContainerId,
}

impl<'a> ListHandler<'a> {
    pub(crate) fn new(doc: &'a mut Document, id: ContainerId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    fn state(&self) -> Option<&ListState> {
        match self.doc.container_state(&self.id) {
            Some(ContainerState::List(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.state().map_or(0, ListState::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn origins(&self, pos: usize) -> (Option<OpId>, Option<OpId>) {
        self.state()
            .map_or((None, None), |s| s.seq().origins_at(pos))
    }

    pub fn insert(&mut self, pos: usize, value: impl Into<Value>) -> Result<()> {
        self.insert_many(pos, vec![value.into()])
    }

    /// Inserts `values` as one run starting at `pos`.
    pub fn insert_many(&mut self, pos: usize, values: Vec<Value>) -> Result<()> {
        check_pos(pos, self.len())?;
        if values.is_empty() {
            return Ok(());
        }
        let values = values.into_iter().map(plain_value).collect::<Result<Vec<_>>>()?;
        let (left, right) = self.origins(pos);
        self.doc
            .apply_local(&self.id, OpContent::ListInsert { left, right, values })?;
        Ok(())
    }

    pub fn push(&mut self, value: impl Into<Value>) -> Result<()> {
        let len = self.len();
        self.insert(len, value)
    }

    /// Removes and returns the last element.
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
        let op = self.doc.apply_local_with(&self.id, |id| OpContent::ListInsert {
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
        let ids = self
            .state()
            .map(|s| s.seq().visible_ids(pos, len))
            .unwrap_or_default();
        self.doc.apply_local(
            &self.id,
            OpContent::ListDelete {
                targets: ids_to_spans(ids),
            },
        )?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        let len = self.len();
        self.delete(0, len)
    }

    pub fn get(&self, pos: usize) -> Option<Value> {
        self.state()?.get(pos).cloned()
    }

    /// Value at `pos` with a nested container materialized.
    pub fn get_deep(&self, pos: usize) -> Option<Value> {
        match self.get(pos)? {
            Value::Container(child) => Some(self.doc.get_container_deep_value(&child)),
            other => Some(other),
        }
    }

    /// Id of the element at `pos`; stable across concurrent edits.
    pub fn get_id_at(&self, pos: usize) -> Option<OpId> {
        self.state()?.get_id_at(pos)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.state().map(ListState::to_vec).unwrap_or_default()
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
