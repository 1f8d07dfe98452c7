use super::OpId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimal set of ids with no known causal successor.
///
/// Kept sorted and deduplicated so equal frontiers compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frontiers(Vec<OpId>);

impl Frontiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_id(id: OpId) -> Self {
        Self(vec![id])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpId> + '_ {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[OpId] {
        &self.0
    }

    pub fn contains(&self, id: &OpId) -> bool {
        self.0.binary_search(id).is_ok()
    }

    pub fn insert(&mut self, id: OpId) {
        if let Err(pos) = self.0.binary_search(&id) {
            self.0.insert(pos, id);
        }
    }

    pub fn remove(&mut self, id: &OpId) -> bool {
        match self.0.binary_search(id) {
            Ok(pos) => {
                self.0.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Advances the frontier past a newly appended change: its deps gain a
    /// successor and `last` has none yet.
    pub fn update_on_append(&mut self, deps: &Frontiers, last: OpId) {
        for dep in deps.iter() {
            self.remove(dep);
        }
        // Earlier atoms of the same peer are dominated by `last`.
        self.0
            .retain(|id| !(id.peer == last.peer && id.counter < last.counter));
        self.insert(last);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let _ = ciborium::ser::into_writer(self, &mut out);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::DecodeError> {
        let raw: Vec<OpId> = ciborium::de::from_reader(bytes)
            .map_err(|e| crate::error::DecodeError::Body(e.to_string()))?;
        Ok(raw.into_iter().collect())
    }
}

impl FromIterator<OpId> for Frontiers {
    fn from_iter<T: IntoIterator<Item = OpId>>(iter: T) -> Self {
        let mut ids: Vec<OpId> = iter.into_iter().collect();
        ids.sort();
        ids.dedup();
        Self(ids)
    }
}

impl From<OpId> for Frontiers {
    fn from(id: OpId) -> Self {
        Self::from_id(id)
    }
}

impl From<Vec<OpId>> for Frontiers {
    fn from(ids: Vec<OpId>) -> Self {
        ids.into_iter().collect()
    }
}

impl fmt::Display for Frontiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "]")
    }
}
