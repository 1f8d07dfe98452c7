use crate::change::{Change, Op};
use crate::event::ContainerSnapshot;
use crate::value::ContainerId;
use crate::version::{Counter, Frontiers, Lamport, OpId, PeerId};
use indexmap::IndexMap;

/// Local ops applied to the state but not yet sealed into a change.
///
/// Counters and Lamport timestamps are assigned when an op is recorded, so
/// the sealed change is exactly what every other replica will replay.
#[derive(Debug)]
pub(crate) struct Transaction {
    peer: PeerId,
    start_counter: Counter,
    start_lamport: Lamport,
    deps: Frontiers,
    next_counter: Counter,
    ops: Vec<Op>,
    /// State of each touched container before its first op in this
    /// transaction (`None` if it did not exist), kept only while someone
    /// listens for events.
    before: IndexMap<ContainerId, Option<ContainerSnapshot>>,
}

impl Transaction {
    pub(crate) fn new(peer: PeerId, counter: Counter, lamport: Lamport, deps: Frontiers) -> Self {
        Self {
            peer,
            start_counter: counter,
            start_lamport: lamport,
            deps,
            next_counter: counter,
            ops: Vec::new(),
            before: IndexMap::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Id the next recorded op will get.
    pub(crate) fn next_id(&self) -> OpId {
        OpId::new(self.peer, self.next_counter)
    }

    pub(crate) fn next_lamport(&self) -> Lamport {
        self.start_lamport + (self.next_counter - self.start_counter)
    }

    pub(crate) fn has_before(&self, container: &ContainerId) -> bool {
        self.before.contains_key(container)
    }

    pub(crate) fn record_before(&mut self, container: ContainerId, snapshot: Option<ContainerSnapshot>) {
        self.before.entry(container).or_insert(snapshot);
    }

    pub(crate) fn push(&mut self, op: Op) {
        debug_assert_eq!(op.counter, self.next_counter);
        self.next_counter = op.ctr_end();
        self.ops.push(op);
    }

    pub(crate) fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Seals the transaction.
    pub(crate) fn into_change(
        self,
        timestamp: i64,
        message: Option<String>,
        origin: Option<String>,
    ) -> (Change, IndexMap<ContainerId, Option<ContainerSnapshot>>) {
        let change = Change {
            id: OpId::new(self.peer, self.start_counter),
            lamport: self.start_lamport,
            deps: self.deps,
            timestamp,
            message,
            ops: self.ops,
            origin,
        };
        (change, self.before)
    }
}
