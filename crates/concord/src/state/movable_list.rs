//! Movable list.
//!
//! The sequence holds *position items*; each one names the element it
//! places. An element is created by an insert (its id is the insert atom
//! id, which is also its first position item). A move adds a new position
//! item and, if its `IdLp` beats the element's current one, makes it the
//! element's position. Only the winning position item of a live element is
//! visible, so concurrent moves of one element resolve last-writer-wins and
//! the element keeps its identity and value across moves.

use super::sequence::{SeqItem, Sequence};
use crate::value::Value;
use crate::version::{IdLp, OpId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub pos: OpId,
    pub pos_lp: IdLp,
    pub value: Value,
    pub value_lp: IdLp,
    pub deleted: bool,
}

/// A visible element.
#[derive(Debug, Clone, PartialEq)]
pub struct MovableEntry {
    pub elem: OpId,
    pub pos: OpId,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovableListState {
    positions: Sequence<OpId>,
    elements: BTreeMap<OpId, Element>,
}

impl MovableListState {
    pub fn positions(&self) -> &Sequence<OpId> {
        &self.positions
    }

    pub fn element(&self, elem: OpId) -> Option<&Element> {
        self.elements.get(&elem)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        id: OpId,
        lamport: u32,
        left: Option<OpId>,
        right: Option<OpId>,
        values: &[Value],
        tombstone: bool,
    ) {
        let mut left = left;
        for (i, value) in values.iter().enumerate() {
            let elem = id.inc(i as u32);
            let lp = IdLp::new(lamport + i as u32, id.peer);
            self.positions.integrate(SeqItem {
                id: elem,
                left,
                right,
                value: elem,
                deleted: tombstone,
            });
            self.elements.entry(elem).or_insert(Element {
                pos: elem,
                pos_lp: lp,
                value: value.clone(),
                value_lp: lp,
                deleted: tombstone,
            });
            left = Some(elem);
        }
    }

    /// Integrates a move's position item; `apply` is false for replays
    /// that must keep the item addressable without moving anything.
    pub fn mov(
        &mut self,
        id: OpId,
        lp: IdLp,
        elem: OpId,
        left: Option<OpId>,
        right: Option<OpId>,
        apply: bool,
    ) -> bool {
        self.positions.integrate(SeqItem {
            id,
            left,
            right,
            value: elem,
            deleted: true,
        });
        if !apply {
            return false;
        }
        let Some(element) = self.elements.get_mut(&elem) else {
            return false;
        };
        if lp <= element.pos_lp {
            return false;
        }
        let old = element.pos;
        element.pos = id;
        element.pos_lp = lp;
        let visible = !element.deleted;
        self.positions.delete(old);
        if visible {
            if let Some(item) = self.positions.get_mut(id) {
                item.deleted = false;
            }
        }
        true
    }

    pub fn set(&mut self, elem: OpId, value: Value, lp: IdLp) -> bool {
        match self.elements.get_mut(&elem) {
            Some(element) if lp > element.value_lp => {
                element.value = value;
                element.value_lp = lp;
                true
            }
            _ => false,
        }
    }

    pub fn delete(&mut self, elem: OpId) -> bool {
        let Some(element) = self.elements.get_mut(&elem) else {
            return false;
        };
        if element.deleted {
            return false;
        }
        element.deleted = true;
        let pos = element.pos;
        self.positions.delete(pos);
        true
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn entries(&self) -> Vec<MovableEntry> {
        self.positions
            .iter_visible()
            .filter_map(|item| {
                let element = self.elements.get(&item.value)?;
                Some(MovableEntry {
                    elem: item.value,
                    pos: item.id,
                    value: element.value.clone(),
                })
            })
            .collect()
    }

    pub fn get(&self, pos: usize) -> Option<&Value> {
        let item = self.positions.iter_visible().nth(pos)?;
        self.elements.get(&item.value).map(|e| &e.value)
    }

    pub fn elem_at(&self, pos: usize) -> Option<OpId> {
        self.positions.iter_visible().nth(pos).map(|item| item.value)
    }

    pub fn index_of_elem(&self, elem: OpId) -> Option<usize> {
        let element = self.elements.get(&elem)?;
        if element.deleted {
            return None;
        }
        self.positions.visible_index_of(element.pos)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.entries().into_iter().map(|e| e.value).collect()
    }

    /// Origins that put `elem` at visible index `to` of the list with
    /// `elem` itself taken out.
    pub fn move_origins(&self, elem: OpId, to: usize) -> (Option<OpId>, Option<OpId>) {
        let current = self.elements.get(&elem).map(|e| e.pos);
        let items = self.positions.items();
        let visible: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.deleted && Some(item.id) != current)
            .map(|(i, _)| i)
            .collect();
        if to == 0 {
            return (None, items.first().map(|item| item.id));
        }
        match visible.get(to - 1) {
            Some(&full) => (Some(items[full].id), items.get(full + 1).map(|item| item.id)),
            None => (items.last().map(|item| item.id), None),
        }
    }
}
