use super::{Counter, IdSpan, OpId, PeerId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Result of comparing two version vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrdering {
    Equal,
    Less,
    Greater,
    Concurrent,
}

impl From<Option<Ordering>> for VersionOrdering {
    fn from(ord: Option<Ordering>) -> Self {
        match ord {
            Some(Ordering::Equal) => VersionOrdering::Equal,
            Some(Ordering::Less) => VersionOrdering::Less,
            Some(Ordering::Greater) => VersionOrdering::Greater,
            None => VersionOrdering::Concurrent,
        }
    }
}

/// Per-peer count of integrated atoms.
///
/// `get(peer)` is the exclusive end: every counter `< get(peer)` of that
/// peer is included. Absent peers read as `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector(BTreeMap<PeerId, Counter>);

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, peer: PeerId) -> Counter {
        self.0.get(&peer).copied().unwrap_or(0)
    }

    /// Raises the end for `peer`; never lowers it.
    pub fn extend_to(&mut self, peer: PeerId, end: Counter) {
        if end == 0 {
            return;
        }
        let slot = self.0.entry(peer).or_insert(0);
        if *slot < end {
            *slot = end;
        }
    }

    /// Sets the end for `peer` exactly (removing the entry when `0`).
    pub fn set_end(&mut self, peer: PeerId, end: Counter) {
        if end == 0 {
            self.0.remove(&peer);
        } else {
            self.0.insert(peer, end);
        }
    }

    pub fn extend_to_include(&mut self, id: OpId) {
        self.extend_to(id.peer, id.counter + 1);
    }

    pub fn includes_id(&self, id: OpId) -> bool {
        id.counter < self.get(id.peer)
    }

    /// `true` when every atom in `other` is also in `self`.
    pub fn includes_vv(&self, other: &VersionVector) -> bool {
        other.0.iter().all(|(peer, end)| self.get(*peer) >= *end)
    }

    /// Pointwise max.
    pub fn merge(&mut self, other: &VersionVector) {
        for (peer, end) in &other.0 {
            self.extend_to(*peer, *end);
        }
    }

    pub fn compare(&self, other: &VersionVector) -> VersionOrdering {
        self.partial_cmp(other).into()
    }

    /// Spans present in `self` but not in `other`.
    pub fn sub_spans(&self, other: &VersionVector) -> Vec<IdSpan> {
        self.0
            .iter()
            .filter_map(|(peer, end)| {
                let start = other.get(*peer);
                (start < *end).then(|| IdSpan::new(*peer, start, *end))
            })
            .collect()
    }

    /// Spans between `from` and `self`, with the `(from, self)` bounds.
    pub fn range_from(&self, from: &VersionVector) -> VersionRange {
        let mut range = VersionRange::default();
        for span in self.sub_spans(from) {
            range.insert(span);
        }
        range
    }

    pub fn iter(&self) -> impl Iterator<Item = (PeerId, Counter)> + '_ {
        self.0.iter().map(|(p, c)| (*p, *c))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Total number of atoms covered.
    pub fn atom_count(&self) -> usize {
        self.0.values().map(|c| *c as usize).sum()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = ciborium::ser::into_writer(self, &mut out);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::DecodeError> {
        ciborium::de::from_reader(bytes)
            .map_err(|e| crate::error::DecodeError::Body(e.to_string()))
    }
}

impl PartialOrd for VersionVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let self_ge = self.includes_vv(other);
        let other_ge = other.includes_vv(self);
        match (self_ge, other_ge) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

impl FromIterator<(PeerId, Counter)> for VersionVector {
    fn from_iter<T: IntoIterator<Item = (PeerId, Counter)>>(iter: T) -> Self {
        let mut vv = VersionVector::new();
        for (peer, end) in iter {
            vv.extend_to(peer, end);
        }
        vv
    }
}

impl fmt::Display for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (peer, end)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{peer}: {end}")?;
        }
        write!(f, "}}")
    }
}

/// Per-peer counter ranges `[start, end)`, used to report what an import
/// integrated and what it left pending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange(BTreeMap<PeerId, (Counter, Counter)>);

impl VersionRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Widens the range for `span.peer` to cover `span`.
    pub fn insert(&mut self, span: IdSpan) {
        if span.is_empty() {
            return;
        }
        self.0
            .entry(span.peer)
            .and_modify(|(start, end)| {
                *start = (*start).min(span.start);
                *end = (*end).max(span.end);
            })
            .or_insert((span.start, span.end));
    }

    pub fn get(&self, peer: PeerId) -> Option<(Counter, Counter)> {
        self.0.get(&peer).copied()
    }

    pub fn contains_id(&self, id: OpId) -> bool {
        self.get(id.peer)
            .is_some_and(|(start, end)| start <= id.counter && id.counter < end)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = IdSpan> + '_ {
        self.0
            .iter()
            .map(|(peer, (start, end))| IdSpan::new(*peer, *start, *end))
    }
}
