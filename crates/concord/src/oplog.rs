//! The operation log: every integrated change plus the pending queue.
//!
//! Changes are stored twice over: per peer, sorted by counter (for id
//! lookup and DAG walks), and as an integration-order list of change ids
//! (a valid causal order, used for replay and export).

use crate::change::Change;
use crate::error::{DocError, Result};
use crate::version::{
    Counter, Frontiers, IdLp, IdSpan, Lamport, OpId, PeerId, VersionOrdering, VersionRange,
    VersionVector,
};
use std::collections::BTreeMap;
use tracing::trace;

/// Where a change stands relative to a version vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// Every atom is already integrated.
    Known,
    /// Deps are satisfied; the not-yet-known tail can be integrated.
    Ready,
    /// Some dep (or an earlier atom of the same peer) is missing.
    Pending,
}

pub(crate) fn readiness(vv: &VersionVector, change: &Change) -> Readiness {
    let end = vv.get(change.peer());
    if change.ctr_end() <= end {
        return Readiness::Known;
    }
    if change.id.counter > end {
        return Readiness::Pending;
    }
    if change.id.counter < end {
        // The unknown tail depends only on atoms we already hold.
        return Readiness::Ready;
    }
    if change.deps.iter().all(|dep| vv.includes_id(*dep)) {
        Readiness::Ready
    } else {
        Readiness::Pending
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpLog {
    changes: BTreeMap<PeerId, Vec<Change>>,
    order: Vec<OpId>,
    vv: VersionVector,
    frontiers: Frontiers,
    next_lamport: Lamport,
    pending: BTreeMap<OpId, Change>,
    len_ops: usize,
}

impl OpLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vv(&self) -> &VersionVector {
        &self.vv
    }

    pub fn frontiers(&self) -> &Frontiers {
        &self.frontiers
    }

    pub fn next_lamport(&self) -> Lamport {
        self.next_lamport
    }

    pub fn len_changes(&self) -> usize {
        self.order.len()
    }

    /// Number of integrated ops (not atoms).
    pub fn len_ops(&self) -> usize {
        self.len_ops
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Counter ranges held back waiting for missing deps.
    pub fn pending_range(&self) -> VersionRange {
        let mut range = VersionRange::new();
        for change in self.pending.values() {
            range.insert(change.id_span());
        }
        range
    }

    pub fn changes_of(&self, peer: PeerId) -> &[Change] {
        self.changes.get(&peer).map_or(&[], Vec::as_slice)
    }

    /// The change containing `id`.
    pub fn get_change(&self, id: OpId) -> Option<&Change> {
        let changes = self.changes.get(&id.peer)?;
        let idx = locate(changes, id.counter)?;
        changes.get(idx)
    }

    pub fn lamport_of(&self, id: OpId) -> Option<Lamport> {
        self.get_change(id).map(|c| c.lamport_of(id.counter))
    }

    pub fn id_lp_of(&self, id: OpId) -> Option<IdLp> {
        self.lamport_of(id).map(|l| IdLp::new(l, id.peer))
    }

    /// All changes in integration (causal) order.
    pub fn iter_changes(&self) -> impl Iterator<Item = &Change> + '_ {
        self.order.iter().filter_map(move |id| self.get_change(*id))
    }

    /// Appends a change whose deps are integrated and whose first atom is
    /// the next counter of its peer.
    pub(crate) fn append(&mut self, change: Change) {
        debug_assert_eq!(readiness(&self.vv, &change), Readiness::Ready);
        debug_assert_eq!(change.id.counter, self.vv.get(change.peer()));
        trace!(id = %change.id, len = change.atom_len(), "append change");
        self.vv.extend_to(change.peer(), change.ctr_end());
        self.frontiers.update_on_append(&change.deps, change.last_id());
        self.next_lamport = self.next_lamport.max(change.lamport_end());
        self.len_ops += change.ops.len();
        self.order.push(change.id);
        self.changes.entry(change.peer()).or_default().push(change);
    }

    pub(crate) fn pending(&self) -> &BTreeMap<OpId, Change> {
        &self.pending
    }

    pub(crate) fn replace_pending(&mut self, pending: BTreeMap<OpId, Change>) {
        self.pending = pending;
    }

    /// Version vector of everything causally at or before `frontiers`.
    ///
    /// Walks the DAG backward from each frontier id. Returns `None` when an
    /// id is not in the log.
    pub fn frontiers_to_vv(&self, frontiers: &Frontiers) -> Option<VersionVector> {
        let mut vv = VersionVector::new();
        let mut stack: Vec<OpId> = frontiers.iter().copied().collect();
        while let Some(id) = stack.pop() {
            let covered = vv.get(id.peer);
            if id.counter < covered {
                continue;
            }
            let changes = self.changes.get(&id.peer)?;
            let idx = locate(changes, id.counter)?;
            let first = changes.partition_point(|c| c.ctr_end() <= covered);
            for change in &changes[first..=idx] {
                stack.extend(change.deps.iter().copied());
            }
            vv.extend_to(id.peer, id.counter + 1);
        }
        Some(vv)
    }

    /// Minimal frontier describing `vv` (ids beyond the log are ignored).
    pub fn vv_to_frontiers(&self, vv: &VersionVector) -> Frontiers {
        let candidates: Vec<OpId> = vv
            .iter()
            .filter_map(|(peer, end)| {
                let end = end.min(self.vv.get(peer));
                (end > 0).then(|| OpId::new(peer, end - 1))
            })
            .collect();
        if candidates.len() <= 1 {
            return candidates.into_iter().collect();
        }
        let closures: Vec<VersionVector> = candidates
            .iter()
            .map(|id| {
                self.frontiers_to_vv(&Frontiers::from_id(*id))
                    .unwrap_or_default()
            })
            .collect();
        candidates
            .iter()
            .enumerate()
            .filter(|(i, id)| {
                !closures
                    .iter()
                    .enumerate()
                    .any(|(j, closure)| j != *i && closure.includes_id(**id))
            })
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn cmp_frontiers(&self, a: &Frontiers, b: &Frontiers) -> Result<VersionOrdering> {
        let a = self.frontiers_to_vv(a).ok_or_else(|| unknown_frontiers(a))?;
        let b = self.frontiers_to_vv(b).ok_or_else(|| unknown_frontiers(b))?;
        Ok(a.compare(&b))
    }

    /// Changes (sliced at the bounds) covering the atoms in `to` but not in
    /// `from`, in causal order.
    pub fn changes_between(&self, from: &VersionVector, to: &VersionVector) -> Vec<Change> {
        let mut out = Vec::new();
        for change in self.iter_changes() {
            let peer = change.peer();
            let start = change.id.counter.max(from.get(peer));
            let end = change.ctr_end().min(to.get(peer));
            if start < end {
                out.push(change.slice(start, end));
            }
        }
        out
    }

    /// Spans of the changes authored by `peer` in `[from, to)`.
    pub fn spans_of(&self, peer: PeerId, from: Counter, to: Counter) -> Vec<IdSpan> {
        self.changes_of(peer)
            .iter()
            .filter(|c| c.id.counter < to && c.ctr_end() > from)
            .map(|c| IdSpan::new(peer, c.id.counter.max(from), c.ctr_end().min(to)))
            .collect()
    }
}

/// Queues a change, keeping the longer of two changes with the same start.
pub(crate) fn enqueue(pending: &mut BTreeMap<OpId, Change>, change: Change) {
    trace!(id = %change.id, "hold change until deps arrive");
    match pending.get(&change.id) {
        Some(existing) if existing.ctr_end() >= change.ctr_end() => {}
        _ => {
            pending.insert(change.id, change);
        }
    }
}

/// Removes and returns the next change of `pending` that is ready against
/// `vv`, trimmed to its unknown tail. Already-known entries are dropped.
/// Works on copies, so admission can be rehearsed before anything is
/// applied.
pub(crate) fn pop_ready_from(
    pending: &mut BTreeMap<OpId, Change>,
    vv: &VersionVector,
) -> Option<Change> {
    loop {
        let (key, state) = pending
            .iter()
            .map(|(k, c)| (*k, readiness(vv, c)))
            .find(|(_, r)| *r != Readiness::Pending)?;
        let change = pending.remove(&key)?;
        if state == Readiness::Known {
            continue;
        }
        let start = vv.get(change.peer());
        return Some(change.slice(start, change.ctr_end()));
    }
}

pub(crate) fn unknown_frontiers(f: &Frontiers) -> DocError {
    DocError::CausalGap(format!("frontiers {f} reference ops missing from the log"))
}

/// Index of the change containing `counter` in a counter-sorted run.
fn locate(changes: &[Change], counter: Counter) -> Option<usize> {
    let idx = changes.partition_point(|c| c.id.counter <= counter);
    if idx == 0 {
        return None;
    }
    changes[idx - 1]
        .contains_id(OpId::new(changes[idx - 1].peer(), counter))
        .then_some(idx - 1)
}
