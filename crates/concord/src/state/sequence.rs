//! Ordered sequence CRDT shared by Text, List and MovableList.
//!
//! Items are never removed; deletion sets a tombstone flag. Concurrent
//! inserts are ordered with the YATA rule on their left/right origins,
//! breaking exact ties by peer id. The resulting order depends only on the
//! set of integrated items, not on integration order, as long as items are
//! integrated causally.
//!
//! The item list is a flat `Vec` scanned linearly: correct, not optimised.

use crate::version::{OpId, PeerId};

#[derive(Debug, Clone, PartialEq)]
pub struct SeqItem<T> {
    pub id: OpId,
    pub left: Option<OpId>,
    pub right: Option<OpId>,
    pub value: T,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence<T> {
    items: Vec<SeqItem<T>>,
}

impl<T> Default for Sequence<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Sequence<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[SeqItem<T>] {
        &self.items
    }

    pub fn full_len(&self) -> usize {
        self.items.len()
    }

    pub fn find(&self, id: OpId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn get(&self, id: OpId) -> Option<&SeqItem<T>> {
        self.find(id).map(|i| &self.items[i])
    }

    pub fn get_mut(&mut self, id: OpId) -> Option<&mut SeqItem<T>> {
        let idx = self.find(id)?;
        self.items.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|item| !item.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter_visible(&self) -> impl Iterator<Item = &SeqItem<T>> + '_ {
        self.items.iter().filter(|item| !item.deleted)
    }

    /// Full-sequence index of the `pos`-th visible item.
    pub fn visible_to_full(&self, pos: usize) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.deleted)
            .nth(pos)
            .map(|(i, _)| i)
    }

    /// Number of visible items strictly before full index `full`.
    pub fn visible_before(&self, full: usize) -> usize {
        self.items[..full.min(self.items.len())]
            .iter()
            .filter(|item| !item.deleted)
            .count()
    }

    /// Visible index of `id` when it is visible.
    pub fn visible_index_of(&self, id: OpId) -> Option<usize> {
        let full = self.find(id)?;
        (!self.items[full].deleted).then(|| self.visible_before(full))
    }

    /// Origins for a local insert at visible position `pos`: left is the
    /// visible item before `pos`, right is whatever item (visible or not)
    /// immediately follows it.
    pub fn origins_at(&self, pos: usize) -> (Option<OpId>, Option<OpId>) {
        if pos == 0 {
            return (None, self.items.first().map(|item| item.id));
        }
        match self.visible_to_full(pos - 1) {
            Some(full) => (
                Some(self.items[full].id),
                self.items.get(full + 1).map(|item| item.id),
            ),
            None => (
                self.items.last().map(|item| item.id),
                None,
            ),
        }
    }

    /// Origins that place new items directly after `id`.
    pub fn origins_after(&self, id: OpId) -> (Option<OpId>, Option<OpId>) {
        match self.find(id) {
            Some(full) => (Some(id), self.items.get(full + 1).map(|item| item.id)),
            None => (self.items.last().map(|item| item.id), None),
        }
    }

    /// Ids of the visible items in `[pos, pos + len)`.
    pub fn visible_ids(&self, pos: usize, len: usize) -> Vec<OpId> {
        self.iter_visible()
            .skip(pos)
            .take(len)
            .map(|item| item.id)
            .collect()
    }

    /// Tombstones `id`. Returns its full index if it was visible.
    pub fn delete(&mut self, id: OpId) -> Option<usize> {
        let full = self.find(id)?;
        let item = &mut self.items[full];
        if item.deleted {
            return None;
        }
        item.deleted = true;
        Some(full)
    }

    fn origin_index(&self, id: Option<OpId>, missing: isize) -> isize {
        id.and_then(|id| self.find(id))
            .map_or(missing, |i| i as isize)
    }

    /// Integrates a remote or local item and returns its full index.
    ///
    /// Unknown origins (only possible with corrupted input) fall back to
    /// the sequence boundaries so integration stays deterministic.
    pub fn integrate(&mut self, item: SeqItem<T>) -> usize {
        if let Some(existing) = self.find(item.id) {
            return existing;
        }
        let len = self.items.len() as isize;
        let left = self.origin_index(item.left, -1);
        let right = if item.right.is_none() {
            len
        } else {
            self.origin_index(item.right, len)
        };
        let mut dest = (left + 1) as usize;
        let mut scanning = false;
        let mut i = dest;
        loop {
            if !scanning {
                dest = i;
            }
            if i as isize >= len || i as isize == right {
                break;
            }
            let other = &self.items[i];
            let other_left = self.origin_index(other.left, -1);
            let other_right = if other.right.is_none() {
                len
            } else {
                self.origin_index(other.right, len)
            };
            if other_left < left {
                break;
            } else if other_left == left {
                if other_right < right {
                    scanning = true;
                } else if other_right == right {
                    if before_by_peer(item.id.peer, other.id.peer) {
                        break;
                    }
                    scanning = false;
                } else {
                    scanning = false;
                }
            }
            i += 1;
        }
        self.items.insert(dest, item);
        dest
    }
}

/// Tie-break between siblings with identical origins.
#[inline]
fn before_by_peer(a: PeerId, b: PeerId) -> bool {
    a < b
}
