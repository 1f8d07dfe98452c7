//! In-process operation delta between two frontiers.

use crate::change::Change;
use crate::version::{Frontiers, VersionRange};

/// The changes causally after `from` and up to `to`, in causal order.
///
/// Produced by [`Document::diff`](crate::Document::diff) and consumed by
/// [`Document::apply_diff`](crate::Document::apply_diff) on any replica.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffSet {
    from: Frontiers,
    to: Frontiers,
    changes: Vec<Change>,
}

impl DiffSet {
    pub(crate) fn new(from: Frontiers, to: Frontiers, changes: Vec<Change>) -> Self {
        Self { from, to, changes }
    }

    pub fn from(&self) -> &Frontiers {
        &self.from
    }

    pub fn to(&self) -> &Frontiers {
        &self.to
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len_changes(&self) -> usize {
        self.changes.len()
    }

    /// Number of atomic ops (one per char, list element, ...).
    pub fn len_ops(&self) -> usize {
        self.changes.iter().map(Change::atom_len).sum()
    }

    /// Id ranges covered by the diff.
    pub fn id_spans(&self) -> VersionRange {
        let mut range = VersionRange::new();
        for change in &self.changes {
            range.insert(change.id_span());
        }
        range
    }
}

#[cfg(test)]
mod tests {
    use crate::version::OpId;
    use crate::Document;

    #[test]
    fn diff_covers_only_the_requested_range() {
        let mut doc = Document::with_peer(1);
        doc.get_text("text").unwrap().insert(0, "ab").unwrap();
        doc.commit();
        let mid = doc.oplog_frontiers().clone();
        doc.get_text("text").unwrap().insert(2, "cd").unwrap();
        doc.commit();
        let end = doc.oplog_frontiers().clone();
        let diff = doc.diff(&mid, &end).unwrap();
        assert_eq!(diff.len_changes(), 1);
        assert_eq!(diff.len_ops(), 2);
        assert!(diff.id_spans().contains_id(OpId::new(1, 2)));
        assert!(!diff.id_spans().contains_id(OpId::new(1, 0)));
        assert!(doc.diff(&end, &end).unwrap().is_empty());
    }
}
