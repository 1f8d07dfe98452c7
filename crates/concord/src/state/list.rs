use super::sequence::{SeqItem, Sequence};
use crate::value::Value;
use crate::version::OpId;

/// Plain list: a sequence of values, element identity is the insert id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListState {
    seq: Sequence<Value>,
}

impl ListState {
    pub fn seq(&self) -> &Sequence<Value> {
        &self.seq
    }

    pub fn insert(
        &mut self,
        id: OpId,
        left: Option<OpId>,
        right: Option<OpId>,
        values: &[Value],
        tombstone: bool,
    ) {
        let mut left = left;
        for (i, value) in values.iter().enumerate() {
            let elem_id = id.inc(i as u32);
            self.seq.integrate(SeqItem {
                id: elem_id,
                left,
                right,
                value: value.clone(),
                deleted: tombstone,
            });
            left = Some(elem_id);
        }
    }

    pub fn delete(&mut self, id: OpId) -> bool {
        self.seq.delete(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&Value> {
        self.seq.iter_visible().nth(pos).map(|item| &item.value)
    }

    pub fn get_id_at(&self, pos: usize) -> Option<OpId> {
        self.seq.iter_visible().nth(pos).map(|item| item.id)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.seq.iter_visible().map(|item| item.value.clone()).collect()
    }

    /// Visible `(id, value)` pairs.
    pub fn entries(&self) -> Vec<(OpId, Value)> {
        self.seq
            .iter_visible()
            .map(|item| (item.id, item.value.clone()))
            .collect()
    }
}
