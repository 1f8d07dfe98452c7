//! Last-writer-wins map. Deletes are kept as entries with no value so a
//! concurrent write with a smaller `IdLp` still loses to them.

use crate::value::Value;
use crate::version::IdLp;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub value: Option<Value>,
    pub lp: IdLp,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapState {
    entries: BTreeMap<String, MapEntry>,
}

impl MapState {
    /// Applies a write; returns `true` when it became the visible winner.
    pub fn set(&mut self, key: &str, value: Option<Value>, lp: IdLp) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.lp >= lp => false,
            Some(entry) => {
                *entry = MapEntry { value, lp };
                true
            }
            None => {
                self.entries.insert(key.to_string(), MapEntry { value, lp });
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).and_then(|e| e.value.as_ref())
    }

    pub fn entry(&self, key: &str) -> Option<&MapEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Live entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.value.as_ref().map(|v| (k, v)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}
