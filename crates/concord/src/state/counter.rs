use crate::version::OpId;
use std::collections::BTreeMap;

/// Sum of float deltas.
///
/// The sum is always accumulated in `OpId` order, so two replicas holding
/// the same deltas agree bit-for-bit even though float addition is not
/// associative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterState {
    deltas: BTreeMap<OpId, f64>,
    value: f64,
}

impl CounterState {
    pub fn apply(&mut self, id: OpId, delta: f64) {
        if self.deltas.contains_key(&id) {
            return;
        }
        let is_last = self.deltas.keys().next_back().map_or(true, |last| *last < id);
        self.deltas.insert(id, delta);
        if is_last {
            self.value += delta;
        } else {
            self.value = self.deltas.values().sum();
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}
