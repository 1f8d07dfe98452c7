//! Identity and causal-position primitives.
//!
//! Every atom (a character, a list element, a map write ...) gets an
//! [`OpId`] `(peer, counter)`. Counters grow by one per atom on each peer.
//! Every atom also gets a Lamport timestamp derived from the change DAG;
//! [`IdLp`] `(lamport, peer)` is the single tie-break order used by every
//! container engine.

mod frontiers;
mod vv;

pub use frontiers::Frontiers;
pub use vv::{VersionOrdering, VersionRange, VersionVector};

use serde::{Deserialize, Serialize};
use std::fmt;

pub type PeerId = u64;
pub type Counter = u32;
pub type Lamport = u32;

// ── OpId ───────────────────────────────────────────────────────────────────

/// Globally unique id of one atom.
///
/// The derived `Ord` groups ids by peer and is only used for map keys; it
/// carries no causal meaning.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct OpId {
    pub peer: PeerId,
    pub counter: Counter,
}

impl OpId {
    pub const fn new(peer: PeerId, counter: Counter) -> Self {
        Self { peer, counter }
    }

    /// The id `offset` atoms later on the same peer.
    #[inline]
    pub fn inc(&self, offset: Counter) -> Self {
        Self::new(self.peer, self.counter + offset)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.peer)
    }
}

// ── IdLp ───────────────────────────────────────────────────────────────────

/// `(lamport, peer)`: the replica-independent total order used for every
/// last-writer-wins decision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct IdLp {
    pub lamport: Lamport,
    pub peer: PeerId,
}

impl IdLp {
    pub const fn new(lamport: Lamport, peer: PeerId) -> Self {
        Self { lamport, peer }
    }
}

impl fmt::Display for IdLp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}@{}", self.lamport, self.peer)
    }
}

// ── IdSpan ─────────────────────────────────────────────────────────────────

/// Contiguous counter range `[start, end)` of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdSpan {
    pub peer: PeerId,
    pub start: Counter,
    pub end: Counter,
}

impl IdSpan {
    pub const fn new(peer: PeerId, start: Counter, end: Counter) -> Self {
        Self { peer, start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, id: OpId) -> bool {
        id.peer == self.peer && self.start <= id.counter && id.counter < self.end
    }

    pub fn first(&self) -> OpId {
        OpId::new(self.peer, self.start)
    }

    pub fn iter(&self) -> impl Iterator<Item = OpId> + '_ {
        (self.start..self.end).map(move |c| OpId::new(self.peer, c))
    }
}

impl fmt::Display for IdSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}@{}", self.start, self.end, self.peer)
    }
}

/// Compresses ids into spans, merging runs of consecutive counters.
///
/// Input order is preserved; only neighbours are merged.
pub fn ids_to_spans<I: IntoIterator<Item = OpId>>(ids: I) -> Vec<IdSpan> {
    let mut spans: Vec<IdSpan> = Vec::new();
    for id in ids {
        match spans.last_mut() {
            Some(last) if last.peer == id.peer && last.end == id.counter => last.end += 1,
            _ => spans.push(IdSpan::new(id.peer, id.counter, id.counter + 1)),
        }
    }
    spans
}
