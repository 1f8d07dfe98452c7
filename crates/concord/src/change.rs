//! Operations and changes.
//!
//! An [`Op`] targets one container and occupies `atom_len()` consecutive
//! counters. A [`Change`] is the committed batch: its ops are contiguous in
//! counter space starting at `change.id`, and `deps` is the frontier its
//! author saw before the batch.

use crate::error::DecodeError;
use crate::fractional_index::FractionalIndex;
use crate::value::{ContainerId, ContainerType, Value};
use crate::version::{Counter, Frontiers, IdLp, IdSpan, Lamport, OpId, PeerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boundary of a style mark, resolved against the full (tombstoned)
/// character sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anchor {
    /// Start of the text.
    Start,
    /// End of the text.
    End,
    /// Just before the given char.
    Before(OpId),
    /// Just after the given char.
    After(OpId),
}

impl Anchor {
    pub fn id(&self) -> Option<OpId> {
        match self {
            Anchor::Before(id) | Anchor::After(id) => Some(*id),
            Anchor::Start | Anchor::End => None,
        }
    }
}

/// Tree parent in an operation: `None` is the root level.
pub type TreeParent = Option<OpId>;

/// Payload of an operation, one variant family per container type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpContent {
    /// Inserts `text` between `left` and `right`. Char `i` gets the id
    /// `op.id + i`; chars after the first use the previous char as their
    /// left origin.
    TextInsert {
        left: Option<OpId>,
        right: Option<OpId>,
        text: String,
    },
    TextDelete {
        targets: Vec<IdSpan>,
    },
    TextMark {
        start: Anchor,
        end: Anchor,
        key: String,
        value: Value,
    },
    /// `value: None` deletes the key.
    MapSet {
        key: String,
        value: Option<Value>,
    },
    ListInsert {
        left: Option<OpId>,
        right: Option<OpId>,
        values: Vec<Value>,
    },
    ListDelete {
        targets: Vec<IdSpan>,
    },
    MovableInsert {
        left: Option<OpId>,
        right: Option<OpId>,
        values: Vec<Value>,
    },
    /// Places `elem` at a new position item between `left` and `right`.
    MovableMove {
        elem: OpId,
        left: Option<OpId>,
        right: Option<OpId>,
    },
    MovableSet {
        elem: OpId,
        value: Value,
    },
    MovableDelete {
        elems: Vec<OpId>,
    },
    /// The created node's id is the op id.
    TreeCreate {
        parent: TreeParent,
        position: FractionalIndex,
    },
    TreeMove {
        target: OpId,
        parent: TreeParent,
        position: FractionalIndex,
    },
    TreeDelete {
        target: OpId,
    },
    CounterIncrement {
        delta: f64,
    },
}

impl OpContent {
    /// Number of counters the op occupies.
    pub fn atom_len(&self) -> usize {
        match self {
            OpContent::TextInsert { text, .. } => text.chars().count(),
            OpContent::ListInsert { values, .. } | OpContent::MovableInsert { values, .. } => {
                values.len()
            }
            _ => 1,
        }
    }

    pub fn container_type(&self) -> ContainerType {
        match self {
            OpContent::TextInsert { .. }
            | OpContent::TextDelete { .. }
            | OpContent::TextMark { .. } => ContainerType::Text,
            OpContent::MapSet { .. } => ContainerType::Map,
            OpContent::ListInsert { .. } | OpContent::ListDelete { .. } => ContainerType::List,
            OpContent::MovableInsert { .. }
            | OpContent::MovableMove { .. }
            | OpContent::MovableSet { .. }
            | OpContent::MovableDelete { .. } => ContainerType::MovableList,
            OpContent::TreeCreate { .. }
            | OpContent::TreeMove { .. }
            | OpContent::TreeDelete { .. } => ContainerType::Tree,
            OpContent::CounterIncrement { .. } => ContainerType::Counter,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpContent::TextInsert { .. } => "text_insert",
            OpContent::TextDelete { .. } => "text_delete",
            OpContent::TextMark { .. } => "text_mark",
            OpContent::MapSet { .. } => "map_set",
            OpContent::ListInsert { .. } => "list_insert",
            OpContent::ListDelete { .. } => "list_delete",
            OpContent::MovableInsert { .. } => "movable_insert",
            OpContent::MovableMove { .. } => "movable_move",
            OpContent::MovableSet { .. } => "movable_set",
            OpContent::MovableDelete { .. } => "movable_delete",
            OpContent::TreeCreate { .. } => "tree_create",
            OpContent::TreeMove { .. } => "tree_move",
            OpContent::TreeDelete { .. } => "tree_delete",
            OpContent::CounterIncrement { .. } => "counter_increment",
        }
    }

    /// Every id this op refers to, excluding container links in values.
    pub fn referenced_ids(&self) -> Vec<OpId> {
        let mut out = Vec::new();
        match self {
            OpContent::TextInsert { left, right, .. }
            | OpContent::ListInsert { left, right, .. }
            | OpContent::MovableInsert { left, right, .. } => {
                out.extend(left.iter().chain(right.iter()).copied());
            }
            OpContent::TextDelete { targets } | OpContent::ListDelete { targets } => {
                for span in targets {
                    if !span.is_empty() {
                        out.push(span.first());
                        out.push(OpId::new(span.peer, span.end - 1));
                    }
                }
            }
            OpContent::TextMark { start, end, .. } => {
                out.extend(start.id().into_iter().chain(end.id()));
            }
            OpContent::MapSet { .. } | OpContent::CounterIncrement { .. } => {}
            OpContent::MovableMove { elem, left, right } => {
                out.push(*elem);
                out.extend(left.iter().chain(right.iter()).copied());
            }
            OpContent::MovableSet { elem, .. } => out.push(*elem),
            OpContent::MovableDelete { elems } => out.extend(elems.iter().copied()),
            OpContent::TreeCreate { parent, .. } => out.extend(parent.iter().copied()),
            OpContent::TreeMove { target, parent, .. } => {
                out.push(*target);
                out.extend(parent.iter().copied());
            }
            OpContent::TreeDelete { target } => out.push(*target),
        }
        out
    }

    /// Values carried by the op (used to find container links).
    pub fn values(&self) -> Vec<&Value> {
        match self {
            OpContent::MapSet { value, .. } => value.iter().collect(),
            OpContent::ListInsert { values, .. } | OpContent::MovableInsert { values, .. } => {
                values.iter().collect()
            }
            OpContent::MovableSet { value, .. } => vec![value],
            _ => Vec::new(),
        }
    }
}

/// One operation inside a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub counter: Counter,
    pub container: ContainerId,
    pub content: OpContent,
}

impl Op {
    pub fn atom_len(&self) -> usize {
        self.content.atom_len()
    }

    pub fn ctr_end(&self) -> Counter {
        self.counter + self.atom_len() as Counter
    }

    /// The atoms `[from, to)` (op-relative offsets) of an insert op.
    ///
    /// Slicing keeps the implicit left-origin chain: the first kept atom
    /// gets the previous atom of the same op as its left origin.
    pub fn slice(&self, peer: PeerId, from: usize, to: usize) -> Op {
        if from == 0 && to >= self.atom_len() {
            return self.clone();
        }
        let left_for = |left: &Option<OpId>| {
            if from == 0 {
                *left
            } else {
                Some(OpId::new(peer, self.counter + from as Counter - 1))
            }
        };
        let content = match &self.content {
            OpContent::TextInsert { left, right, text } => OpContent::TextInsert {
                left: left_for(left),
                right: *right,
                text: text.chars().skip(from).take(to - from).collect(),
            },
            OpContent::ListInsert {
                left,
                right,
                values,
            } => OpContent::ListInsert {
                left: left_for(left),
                right: *right,
                values: values[from..to].to_vec(),
            },
            OpContent::MovableInsert {
                left,
                right,
                values,
            } => OpContent::MovableInsert {
                left: left_for(left),
                right: *right,
                values: values[from..to].to_vec(),
            },
            other => other.clone(),
        };
        Op {
            counter: self.counter + from as Counter,
            container: self.container.clone(),
            content,
        }
    }

    /// Structural checks that need no document state.
    pub fn check(&self) -> Result<(), String> {
        if self.container.container_type() != self.content.container_type() {
            return Err(format!(
                "{} op targets {} container",
                self.content.name(),
                self.container.container_type()
            ));
        }
        if self.atom_len() == 0 {
            return Err(format!("empty {} op", self.content.name()));
        }
        match &self.content {
            OpContent::TextDelete { targets } | OpContent::ListDelete { targets }
                if targets.iter().any(IdSpan::is_empty) =>
            {
                Err("empty delete span".into())
            }
            OpContent::CounterIncrement { delta } if !delta.is_finite() => {
                Err("non-finite counter delta".into())
            }
            OpContent::TreeCreate { position, .. } | OpContent::TreeMove { position, .. }
                if !position.is_valid() =>
            {
                Err(format!("invalid tree position {position}"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x{} on {}",
            self.content.name(),
            self.counter,
            self.atom_len(),
            self.container
        )
    }
}

/// A committed batch of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Id of the first atom.
    pub id: OpId,
    /// Lamport timestamp of the first atom.
    pub lamport: Lamport,
    pub deps: Frontiers,
    /// Unix seconds, `0` when not recorded.
    pub timestamp: i64,
    pub message: Option<String>,
    pub ops: Vec<Op>,
    /// Local-only origin tag; never encoded.
    #[serde(skip)]
    pub origin: Option<String>,
}

impl Change {
    pub fn peer(&self) -> PeerId {
        self.id.peer
    }

    pub fn atom_len(&self) -> usize {
        self.ops.iter().map(Op::atom_len).sum()
    }

    pub fn ctr_end(&self) -> Counter {
        self.id.counter + self.atom_len() as Counter
    }

    pub fn id_span(&self) -> IdSpan {
        IdSpan::new(self.peer(), self.id.counter, self.ctr_end())
    }

    pub fn last_id(&self) -> OpId {
        OpId::new(self.peer(), self.ctr_end().saturating_sub(1))
    }

    pub fn lamport_end(&self) -> Lamport {
        self.lamport + self.atom_len() as Lamport
    }

    pub fn contains_id(&self, id: OpId) -> bool {
        self.id_span().contains(id)
    }

    pub fn lamport_of(&self, counter: Counter) -> Lamport {
        self.lamport + (counter - self.id.counter)
    }

    pub fn id_lp_of(&self, counter: Counter) -> IdLp {
        IdLp::new(self.lamport_of(counter), self.peer())
    }

    /// The part of the change covering counters `[from, to)`.
    ///
    /// A slice starting mid-change depends only on the atom before it.
    pub fn slice(&self, from: Counter, to: Counter) -> Change {
        let from = from.max(self.id.counter);
        let to = to.min(self.ctr_end());
        if from == self.id.counter && to == self.ctr_end() {
            return self.clone();
        }
        let peer = self.peer();
        let ops = self
            .ops
            .iter()
            .filter(|op| op.counter < to && op.ctr_end() > from)
            .map(|op| {
                let start = from.saturating_sub(op.counter) as usize;
                let end = (to.min(op.ctr_end()) - op.counter) as usize;
                op.slice(peer, start, end)
            })
            .collect();
        let deps = if from > self.id.counter {
            Frontiers::from_id(OpId::new(peer, from - 1))
        } else {
            self.deps.clone()
        };
        Change {
            id: OpId::new(peer, from),
            lamport: self.lamport_of(from),
            deps,
            timestamp: self.timestamp,
            message: self.message.clone(),
            ops,
            origin: self.origin.clone(),
        }
    }

    /// Structural validation of a decoded change.
    pub fn check(&self) -> Result<(), DecodeError> {
        let invalid = |reason: String| DecodeError::InvalidChange {
            id: self.id,
            reason,
        };
        if self.ops.is_empty() {
            return Err(invalid("change has no ops".into()));
        }
        let mut expected = self.id.counter;
        for op in &self.ops {
            if op.counter != expected {
                return Err(invalid(format!(
                    "op counter {} does not follow {}",
                    op.counter, expected
                )));
            }
            op.check().map_err(invalid)?;
            expected = expected
                .checked_add(op.atom_len() as Counter)
                .ok_or_else(|| invalid("counter overflow".into()))?;
        }
        if self.lamport.checked_add(self.atom_len() as Lamport).is_none() {
            return Err(invalid("lamport overflow".into()));
        }
        for dep in self.deps.iter() {
            if dep.peer == self.peer() && dep.counter >= self.id.counter {
                return Err(invalid(format!("depends on its own future atom {dep}")));
            }
        }
        Ok(())
    }

    pub fn meta(&self) -> ChangeMeta {
        ChangeMeta {
            id: self.id,
            lamport: self.lamport,
            deps: self.deps.clone(),
            timestamp: self.timestamp,
            message: self.message.clone(),
            len: self.atom_len(),
        }
    }
}

/// Metadata of a change without its ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMeta {
    pub id: OpId,
    pub lamport: Lamport,
    pub deps: Frontiers,
    pub timestamp: i64,
    pub message: Option<String>,
    pub len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_cid() -> ContainerId {
        ContainerId::new_root("text", ContainerType::Text)
    }

    fn change() -> Change {
        Change {
            id: OpId::new(1, 0),
            lamport: 10,
            deps: Frontiers::from_id(OpId::new(2, 4)),
            timestamp: 0,
            message: None,
            ops: vec![
                Op {
                    counter: 0,
                    container: text_cid(),
                    content: OpContent::TextInsert {
                        left: None,
                        right: None,
                        text: "abcd".into(),
                    },
                },
                Op {
                    counter: 4,
                    container: text_cid(),
                    content: OpContent::TextDelete {
                        targets: vec![IdSpan::new(1, 1, 2)],
                    },
                },
            ],
            origin: None,
        }
    }

    #[test]
    fn spans_and_lamports() {
        let c = change();
        assert_eq!(c.atom_len(), 5);
        assert_eq!(c.last_id(), OpId::new(1, 4));
        assert_eq!(c.lamport_of(3), 13);
        assert_eq!(c.lamport_end(), 15);
        assert!(c.check().is_ok());
    }

    #[test]
    fn slice_mid_insert_rewires_origin_and_deps() {
        let c = change().slice(2, 5);
        assert_eq!(c.id, OpId::new(1, 2));
        assert_eq!(c.lamport, 12);
        assert_eq!(c.deps, Frontiers::from_id(OpId::new(1, 1)));
        assert_eq!(c.atom_len(), 3);
        match &c.ops[0].content {
            OpContent::TextInsert { left, text, .. } => {
                assert_eq!(*left, Some(OpId::new(1, 1)));
                assert_eq!(text, "cd");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(c.check().is_ok());
    }

    #[test]
    fn check_rejects_gaps_and_type_mismatch() {
        let mut c = change();
        c.ops[1].counter = 7;
        assert!(matches!(c.check(), Err(DecodeError::InvalidChange { .. })));

        let mut c = change();
        c.ops[0].container = ContainerId::new_root("m", ContainerType::Map);
        assert!(c.check().is_err());

        let mut c = change();
        c.deps = Frontiers::from_id(OpId::new(1, 3));
        assert!(c.check().is_err());
    }

    #[test]
    fn check_rejects_tree_positions_without_room_below() {
        let tree = ContainerId::new_root("tree", ContainerType::Tree);
        for bytes in [vec![], vec![0], vec![7, 0]] {
            let mut c = change();
            c.ops.truncate(1);
            c.ops[0] = Op {
                counter: 0,
                container: tree.clone(),
                content: OpContent::TreeCreate {
                    parent: None,
                    position: FractionalIndex::from_bytes(bytes),
                },
            };
            assert!(matches!(c.check(), Err(DecodeError::InvalidChange { .. })));
        }
    }
}
