//! Causal admission of remote changes.
//!
//! Admission is rehearsed on copies of the version vector and the pending
//! queue before anything is applied: every change that would become ready
//! is checked against what the document would hold at that point. A bad
//! change from the incoming payload rejects the whole import; a bad change
//! left pending by an earlier import is dropped.

use crate::change::{Change, OpContent};
use crate::error::DecodeError;
use crate::oplog::{enqueue, pop_ready_from, OpLog};
use crate::state::{tree_meta_id, DocState};
use crate::value::{ContainerId, Value};
use crate::version::{IdSpan, OpId, VersionVector};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

pub(crate) struct Admission {
    /// Changes to apply, in order, already trimmed to their unknown tail.
    pub ready: Vec<Change>,
    /// The pending queue after admission.
    pub pending: BTreeMap<OpId, Change>,
}

pub(crate) fn plan(
    oplog: &OpLog,
    state: &DocState,
    incoming: Vec<Change>,
) -> Result<Admission, DecodeError> {
    let incoming_spans: Vec<IdSpan> = incoming.iter().map(Change::id_span).collect();
    let mut pending = oplog.pending().clone();
    for change in incoming {
        enqueue(&mut pending, change);
    }
    let mut vv = oplog.vv().clone();
    let mut created: BTreeSet<ContainerId> = BTreeSet::new();
    let mut ready = Vec::new();
    while let Some(change) = pop_ready_from(&mut pending, &vv) {
        match check_refs(&change, &vv, state, &mut created) {
            Ok(()) => {
                vv.extend_to(change.peer(), change.ctr_end());
                ready.push(change);
            }
            Err(reason) if incoming_spans.iter().any(|s| s.contains(change.id)) => {
                return Err(DecodeError::InvalidChange {
                    id: change.id,
                    reason,
                });
            }
            Err(reason) => {
                warn!(id = %change.id, %reason, "dropping invalid pending change");
            }
        }
    }
    Ok(Admission { ready, pending })
}

/// Every id and container an op refers to must already be known, or be an
/// earlier atom of the same change.
fn check_refs(
    change: &Change,
    vv: &VersionVector,
    state: &DocState,
    created: &mut BTreeSet<ContainerId>,
) -> Result<(), String> {
    let peer = change.peer();
    for op in &change.ops {
        if let ContainerId::Normal { .. } = &op.container {
            if !state.contains(&op.container) && !created.contains(&op.container) {
                return Err(format!("{op} targets an unknown container"));
            }
        }
        for id in op.content.referenced_ids() {
            let earlier_in_change =
                id.peer == peer && id.counter >= change.id.counter && id.counter < op.counter;
            if !vv.includes_id(id) && !earlier_in_change {
                return Err(format!("{op} references unknown id {id}"));
            }
        }
        for (offset, value) in op.content.values().into_iter().enumerate() {
            if let Value::Container(child) = value {
                let expected = OpId::new(peer, op.counter + offset as u32);
                if child.op_id() != Some(expected) {
                    return Err(format!("{op} links container {child} it did not create"));
                }
                created.insert(child.clone());
            }
        }
        if let OpContent::TreeCreate { .. } = op.content {
            created.insert(tree_meta_id(OpId::new(peer, op.counter)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Op;
    use crate::value::ContainerType;
    use crate::version::Frontiers;

    fn change(peer: u64, counter: u32, deps: &[OpId], op: OpContent, container: ContainerId) -> Change {
        Change {
            id: OpId::new(peer, counter),
            lamport: counter,
            deps: deps.iter().copied().collect::<Frontiers>(),
            timestamp: 0,
            message: None,
            ops: vec![Op {
                counter,
                container,
                content: op,
            }],
            origin: None,
        }
    }

    fn text() -> ContainerId {
        ContainerId::new_root("t", ContainerType::Text)
    }

    #[test]
    fn unknown_reference_rejects_payload() {
        let log = OpLog::new();
        let state = DocState::new();
        let bad = change(
            1,
            0,
            &[],
            OpContent::TextInsert {
                left: Some(OpId::new(9, 9)),
                right: None,
                text: "x".into(),
            },
            text(),
        );
        assert!(matches!(
            plan(&log, &state, vec![bad]),
            Err(DecodeError::InvalidChange { .. })
        ));
    }

    #[test]
    fn missing_deps_stay_pending() {
        let log = OpLog::new();
        let state = DocState::new();
        let later = change(
            2,
            0,
            &[OpId::new(1, 0)],
            OpContent::TextInsert {
                left: Some(OpId::new(1, 0)),
                right: None,
                text: "b".into(),
            },
            text(),
        );
        let plan = plan(&log, &state, vec![later]).unwrap();
        assert!(plan.ready.is_empty());
        assert_eq!(plan.pending.len(), 1);
    }

    #[test]
    fn foreign_container_link_is_rejected() {
        let log = OpLog::new();
        let state = DocState::new();
        let map = ContainerId::new_root("m", ContainerType::Map);
        let stolen = ContainerId::new_normal(OpId::new(5, 0), ContainerType::List);
        let bad = change(
            1,
            0,
            &[],
            OpContent::MapSet {
                key: "k".into(),
                value: Some(Value::Container(stolen)),
            },
            map,
        );
        assert!(plan(&log, &state, vec![bad]).is_err());
    }
}
